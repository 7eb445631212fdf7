use serde_json::{Map, Value};
use tracing::debug;

use tilewalk_core::types::WorkflowData;

use super::{ConfigReader, ConfigReport, TileOutput};
use crate::condition::{evaluate_expression, is_truthy};

/// Two-way branch on a condition.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicBuilderTile {
    pub condition: Value,
    /// When set, evaluated against the workflow data instead of `condition`.
    pub expression: Option<String>,
    pub true_tile: Option<String>,
    pub false_tile: Option<String>,
}

impl LogicBuilderTile {
    pub fn new(condition: bool, true_tile: Option<&str>, false_tile: Option<&str>) -> Self {
        Self {
            condition: Value::Bool(condition),
            expression: None,
            true_tile: true_tile.map(str::to_string),
            false_tile: false_tile.map(str::to_string),
        }
    }

    pub fn configure(configuration: &Map<String, Value>) -> (Self, ConfigReport) {
        let mut reader = ConfigReader::new(configuration);
        let tile = Self {
            condition: reader.value("condition", Value::Bool(true)),
            expression: reader.optional_string("expression"),
            true_tile: reader.tile_ref("true_tile"),
            false_tile: reader.tile_ref("false_tile"),
        };
        (tile, reader.finish())
    }

    /// Evaluate the condition. Only `next_tile` is returned.
    pub fn execute(&self, data: &WorkflowData) -> TileOutput {
        let met = match self.expression {
            Some(ref expr) => evaluate_expression(expr, data),
            None => is_truthy(&self.condition),
        };

        let next = if met { &self.true_tile } else { &self.false_tile };
        debug!(condition_met = met, next_tile = ?next, "Condition evaluated");
        TileOutput::next(next.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_branches() {
        let data = WorkflowData::new();
        for condition in [true, false] {
            let out = LogicBuilderTile::new(condition, Some("yes"), Some("no")).execute(&data);
            let expected = if condition { "yes" } else { "no" };
            assert_eq!(out.next_tile(), Some(expected));
            assert_eq!(out.values.len(), 1);
        }
    }

    #[test]
    fn test_null_branch() {
        let out = LogicBuilderTile::new(false, Some("yes"), None).execute(&WorkflowData::new());
        assert_eq!(out.values.get("next_tile"), Some(&Value::Null));
    }

    #[test]
    fn test_configure_defaults() {
        let (tile, report) = LogicBuilderTile::configure(&Map::new());
        assert_eq!(tile.condition, json!(true));
        assert!(tile.expression.is_none());
        assert_eq!(report.defaulted, vec!["condition", "true_tile", "false_tile"]);
    }

    #[test]
    fn test_truthy_condition_values() {
        let config = json!({"condition": 0, "true_tile": "t", "false_tile": "f"});
        let (tile, report) = LogicBuilderTile::configure(config.as_object().unwrap());
        assert!(report.defaulted.is_empty());
        assert_eq!(tile.execute(&WorkflowData::new()).next_tile(), Some("f"));

        let config = json!({"condition": "yes", "true_tile": "t", "false_tile": "f"});
        let (tile, _) = LogicBuilderTile::configure(config.as_object().unwrap());
        assert_eq!(tile.execute(&WorkflowData::new()).next_tile(), Some("t"));
    }

    #[test]
    fn test_expression_reads_workflow_data() {
        let config = json!({
            "condition": false,
            "expression": "selected_option == \"Yes\"",
            "true_tile": "approve",
            "false_tile": "reject"
        });
        let (tile, _) = LogicBuilderTile::configure(config.as_object().unwrap());

        let mut data = WorkflowData::new();
        data.set_str("selected_option", "Yes");
        assert_eq!(tile.execute(&data).next_tile(), Some("approve"));

        data.set_str("selected_option", "No");
        assert_eq!(tile.execute(&data).next_tile(), Some("reject"));
    }
}
