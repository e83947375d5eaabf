//! Cascaded choice injection.
//!
//! An injector adds its own generators in front of a decision point the
//! program requested. Their choices are applied to the state before the
//! program's instruction runs again, so every combination in the group is a
//! separate transition from the same snapshot.

use crate::error::{SearchError, SearchResult};
use pathwise_choice::{ChoiceGenerator, ChoiceRequest, ChoiceValue};
use pathwise_state::{ProgramState, StateResult, Value};
use tracing::debug;

pub trait ChoiceInjector {
    /// Generators to register before `request`. Called once per new
    /// decision point, never on re-execution.
    fn inject(&mut self, request: &ChoiceRequest, state: &ProgramState) -> SearchResult<Vec<ChoiceGenerator>>;

    /// Applies the current choice of `cg` to `state`. Returns false if `cg`
    /// was not created by this injector.
    fn apply(&mut self, cg: &ChoiceGenerator, value: &ChoiceValue, state: &mut ProgramState) -> StateResult<bool>;
}

/// Perturbs an integer static field by flipping `nbits` of its low `width`
/// bits, exploring the unperturbed value first.
#[derive(Debug, Clone)]
pub struct BitFlipInjector {
    class: String,
    field: String,
    width: u32,
    nbits: u32,
    location: Option<String>,
    name: String,
}

impl BitFlipInjector {
    pub fn new(class: &str, field: &str, width: u32, nbits: u32) -> Self {
        Self {
            class: class.to_string(),
            field: field.to_string(),
            width,
            nbits,
            location: None,
            name: format!("bitFlip({class}.{field})"),
        }
    }

    /// Only inject at decision points requested from `location`.
    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl ChoiceInjector for BitFlipInjector {
    fn inject(&mut self, request: &ChoiceRequest, state: &ProgramState) -> SearchResult<Vec<ChoiceGenerator>> {
        if self.location.as_ref().is_some_and(|l| *l != request.location) {
            return Ok(Vec::new());
        }
        // not perturbable yet: class not initialized or field not an int
        let Ok(Value::Int(current)) = state.get_static(&self.class, &self.field) else {
            return Ok(Vec::new());
        };
        let cg = ChoiceGenerator::bit_flip(self.name.clone(), *current, self.width, self.nbits)
            .map_err(SearchError::from_choice)?
            .with_location(request.location.clone());
        debug!(cg = %self.name, at = %request, "injecting bit flips");
        Ok(vec![cg])
    }

    fn apply(&mut self, cg: &ChoiceGenerator, value: &ChoiceValue, state: &mut ProgramState) -> StateResult<bool> {
        if cg.name() != self.name {
            return Ok(false);
        }
        let Some(v) = value.as_int() else {
            return Ok(false);
        };
        state.set_static(&self.class, &self.field, Value::Int(v))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathwise_state::ClassRegistry;
    use std::sync::Arc;

    fn state(x: Value) -> ProgramState {
        let mut reg = ClassRegistry::new();
        reg.define("Main", &[], &["x"]);
        let mut s = ProgramState::new(Arc::new(reg));
        s.init_class("Main").unwrap();
        s.set_static("Main", "x", x).unwrap();
        s
    }

    #[test]
    fn test_injects_flips_of_current_value() {
        let mut inj = BitFlipInjector::new("Main", "x", 3, 1);
        let req = ChoiceRequest::boolean("flag", "Main:7");
        let cgs = inj.inject(&req, &state(Value::Int(0b101))).unwrap();
        assert_eq!(cgs.len(), 1);
        assert_eq!(cgs[0].location(), "Main:7");
        let values: Vec<i64> = cgs[0].all_choices().iter().filter_map(ChoiceValue::as_int).collect();
        assert_eq!(values, vec![0b101, 0b100, 0b111, 0b001]);
    }

    #[test]
    fn test_location_filter_and_non_int_field() {
        let mut inj = BitFlipInjector::new("Main", "x", 8, 1).at("Main:1");
        let elsewhere = ChoiceRequest::boolean("flag", "Main:2");
        assert!(inj.inject(&elsewhere, &state(Value::Int(1))).unwrap().is_empty());
        let here = ChoiceRequest::boolean("flag", "Main:1");
        assert!(inj.inject(&here, &state(Value::Bool(true))).unwrap().is_empty());
        assert_eq!(inj.inject(&here, &state(Value::Int(1))).unwrap().len(), 1);
    }

    #[test]
    fn test_apply_only_own_generators() {
        let mut inj = BitFlipInjector::new("Main", "x", 8, 1);
        let mut s = state(Value::Int(0));
        let own = ChoiceGenerator::bit_flip(inj.name().to_string(), 0, 8, 1).unwrap();
        assert!(inj.apply(&own, &ChoiceValue::Int(4), &mut s).unwrap());
        assert_eq!(s.get_static("Main", "x").unwrap(), &Value::Int(4));
        let other = ChoiceGenerator::boolean("flag");
        assert!(!inj.apply(&other, &ChoiceValue::Bool(true), &mut s).unwrap());
    }

    #[test]
    fn test_invalid_width_is_configuration_error() {
        let mut inj = BitFlipInjector::new("Main", "x", 0, 1);
        let req = ChoiceRequest::boolean("flag", "Main:7");
        let err = inj.inject(&req, &state(Value::Int(1))).unwrap_err();
        assert!(matches!(err, SearchError::Configuration(_)));
    }
}
