//! Input registry
//!
//! Holds the named inputs of a project and the override graph between
//! them. An override `naersk.nixpkgs -> nixpkgs` means "when locking
//! `naersk`, use our `nixpkgs` instead of its own". The graph is kept
//! acyclic at all times: every mutation checks for cycles before commit.

use crate::error::{LockstepError, LockstepResult};
use crate::lock::locator::Locator;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// A named external input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDescriptor {
    pub name: String,
    pub locator: Locator,
    /// Dependency slot of this input -> registered input used for it
    pub overrides: BTreeMap<String, String>,
}

impl InputDescriptor {
    /// Inputs this one follows
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.overrides.values().map(String::as_str)
    }
}

/// Registry of inputs keyed by name
#[derive(Debug, Clone, Default)]
pub struct InputRegistry {
    inputs: BTreeMap<String, InputDescriptor>,
}

/// Validate that an input name is usable as a TOML key and a cache label
pub fn validate_input_name(name: &str) -> LockstepResult<()> {
    let invalid = |reason: &str| LockstepError::InvalidInputName {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    if name.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(invalid(
            "must contain only alphanumeric characters, hyphens, or underscores",
        ));
    }
    Ok(())
}

impl InputRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new input.
    ///
    /// Override targets may be registered later; `validate` checks that
    /// they all exist before resolution.
    pub fn register(
        &mut self,
        name: &str,
        locator: Locator,
        overrides: BTreeMap<String, String>,
    ) -> LockstepResult<&InputDescriptor> {
        validate_input_name(name)?;
        for slot in overrides.keys() {
            validate_input_name(slot)?;
        }
        if self.inputs.contains_key(name) {
            return Err(LockstepError::DuplicateName(name.to_string()));
        }

        let targets: Vec<&str> = overrides.values().map(String::as_str).collect();
        if let Some(path) = self.find_cycle(name, &targets) {
            return Err(LockstepError::Cycle { path });
        }

        debug!("Registered input {} ({})", name, locator);
        let descriptor = InputDescriptor {
            name: name.to_string(),
            locator,
            overrides,
        };
        Ok(self.inputs.entry(name.to_string()).or_insert(descriptor))
    }

    /// Make `from` follow `to`, using `to` as the slot name
    pub fn add_override(&mut self, from: &str, to: &str) -> LockstepResult<()> {
        self.add_override_as(from, to, to)
    }

    /// Make slot `slot` of input `from` follow input `to`
    pub fn add_override_as(&mut self, from: &str, slot: &str, to: &str) -> LockstepResult<()> {
        validate_input_name(slot)?;
        validate_input_name(to)?;
        if !self.inputs.contains_key(from) {
            return Err(LockstepError::UnknownInput(from.to_string()));
        }
        if let Some(path) = self.find_cycle(from, &[to]) {
            return Err(LockstepError::Cycle { path });
        }

        if let Some(input) = self.inputs.get_mut(from) {
            input.overrides.insert(slot.to_string(), to.to_string());
        }
        debug!("Input {} slot {} follows {}", from, slot, to);
        Ok(())
    }

    /// Replace the locator of a registered input
    pub fn set_locator(&mut self, name: &str, locator: Locator) -> LockstepResult<()> {
        let input = self
            .inputs
            .get_mut(name)
            .ok_or_else(|| LockstepError::UnknownInput(name.to_string()))?;
        input.locator = locator;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&InputDescriptor> {
        self.inputs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inputs.contains_key(name)
    }

    /// Inputs in name order
    pub fn iter(&self) -> impl Iterator<Item = &InputDescriptor> {
        self.inputs.values()
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Check that every override target is a registered input
    pub fn validate(&self) -> LockstepResult<()> {
        for input in self.inputs.values() {
            for target in input.targets() {
                if !self.inputs.contains_key(target) {
                    return Err(LockstepError::DanglingOverride {
                        input: input.name.clone(),
                        target: target.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Inputs ordered so that every override target precedes its followers.
    ///
    /// Ties are broken by name, so the order is fully deterministic.
    pub fn topological_order(&self) -> LockstepResult<Vec<&InputDescriptor>> {
        self.validate()?;

        let mut pending: BTreeMap<&str, usize> = self
            .inputs
            .values()
            .map(|input| {
                let distinct: BTreeSet<&str> = input.targets().collect();
                (input.name.as_str(), distinct.len())
            })
            .collect();

        let mut followers: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for input in self.inputs.values() {
            for target in input.targets() {
                followers
                    .entry(target)
                    .or_default()
                    .insert(input.name.as_str());
            }
        }

        let mut ready: BTreeSet<&str> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut order = Vec::with_capacity(self.inputs.len());

        while let Some(name) = ready.pop_first() {
            pending.remove(name);
            if let Some(input) = self.inputs.get(name) {
                order.push(input);
            }
            for follower in followers.get(name).into_iter().flatten() {
                if let Some(count) = pending.get_mut(follower) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(*follower);
                    }
                }
            }
        }

        if !pending.is_empty() {
            let path: Vec<String> = pending.keys().map(|s| s.to_string()).collect();
            return Err(LockstepError::Cycle { path });
        }
        Ok(order)
    }

    /// Group inputs into waves: every input's targets live in earlier waves.
    ///
    /// Inputs of one wave are independent of each other.
    pub fn waves(&self) -> LockstepResult<Vec<Vec<&InputDescriptor>>> {
        let order = self.topological_order()?;
        let mut level: BTreeMap<&str, usize> = BTreeMap::new();
        let mut waves: Vec<Vec<&InputDescriptor>> = Vec::new();

        for input in order {
            let depth = input
                .targets()
                .filter_map(|t| level.get(t))
                .map(|l| l + 1)
                .max()
                .unwrap_or(0);
            level.insert(input.name.as_str(), depth);
            if waves.len() <= depth {
                waves.resize_with(depth + 1, Vec::new);
            }
            waves[depth].push(input);
        }

        for wave in &mut waves {
            wave.sort_by(|a, b| a.name.cmp(&b.name));
        }
        Ok(waves)
    }

    /// Would adding edges `from -> targets` close a cycle?
    ///
    /// Returns the offending path `from -> ... -> from`.
    fn find_cycle(&self, from: &str, targets: &[&str]) -> Option<Vec<String>> {
        for target in targets {
            let mut path = vec![from.to_string()];
            let mut visited = BTreeSet::new();
            if self.reaches(target, from, &mut path, &mut visited) {
                return Some(path);
            }
        }
        None
    }

    /// Depth-first search from `node` looking for `goal`, recording the path
    fn reaches(
        &self,
        node: &str,
        goal: &str,
        path: &mut Vec<String>,
        visited: &mut BTreeSet<String>,
    ) -> bool {
        path.push(node.to_string());
        if node == goal {
            return true;
        }
        if visited.insert(node.to_string()) {
            if let Some(input) = self.inputs.get(node) {
                for next in input.targets() {
                    if self.reaches(next, goal, path, visited) {
                        return true;
                    }
                }
            }
        }
        path.pop();
        false
    }
}
