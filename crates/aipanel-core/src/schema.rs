/// Arrow schema definitions for every table the pipeline emits.
///
/// Column names and order are a compatibility contract with the regression
/// scripts that read `panel.parquet`.
pub mod tables {
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    /// Schema for the firm-quarter panel.
    pub fn panel_schema() -> Schema {
        Schema::new(vec![
            Field::new("firm_id", DataType::Utf8, false),
            Field::new("year", DataType::Int32, false),
            Field::new("quarter", DataType::UInt8, false),
            Field::new("group", DataType::Utf8, false),
            Field::new("application_count", DataType::UInt64, false),
            Field::new("rejection_count", DataType::UInt64, false),
            Field::new("rejection_rate", DataType::Float64, true),
            Field::new("treated", DataType::Boolean, false),
            Field::new("post", DataType::Boolean, false),
        ])
    }

    /// Schema for per-record classification and extraction decisions.
    ///
    /// One row per normalised record, so any panel count can be traced back
    /// to the records and rules behind it.
    pub fn decision_schema() -> Schema {
        Schema::new(vec![
            Field::new("application_id", DataType::Utf8, false),
            Field::new("filing_date", DataType::Date32, false),
            Field::new("group", DataType::Utf8, false),
            Field::new("rule", DataType::Utf8, false),
            Field::new("evidence", DataType::Utf8, true),
            Field::new("primary_signal", DataType::Utf8, true),
            Field::new("extraction_pattern", DataType::Utf8, true),
            Field::new("office_action_rounds", DataType::UInt32, false),
            Field::new("any_round_rejected", DataType::Boolean, false),
            Field::new("primary_assignee", DataType::Utf8, true),
            Field::new("firm_id", DataType::Utf8, true),
        ])
    }

    /// Schema for resolved firms.
    pub fn firm_schema() -> Schema {
        Schema::new(vec![
            Field::new("firm_id", DataType::Utf8, false),
            Field::new("canonical_name", DataType::Utf8, false),
            Field::new(
                "alias_names",
                DataType::List(Arc::new(Field::new("item", DataType::Utf8, true))),
                false,
            ),
        ])
    }

    /// Schema for the skip / ambiguity audit log.
    pub fn audit_schema() -> Schema {
        Schema::new(vec![
            Field::new("application_id", DataType::Utf8, false),
            Field::new("stage", DataType::Utf8, false),
            Field::new("kind", DataType::Utf8, false),
            Field::new("detail", DataType::Utf8, true),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::tables;

    #[test]
    fn panel_schema_column_order() {
        let schema = tables::panel_schema();
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(
            names,
            [
                "firm_id",
                "year",
                "quarter",
                "group",
                "application_count",
                "rejection_count",
                "rejection_rate",
                "treated",
                "post"
            ]
        );
        assert!(schema.field_with_name("rejection_rate").unwrap().is_nullable());
        assert!(!schema.field_with_name("application_count").unwrap().is_nullable());
    }

    #[test]
    fn decision_schema_has_expected_fields() {
        let schema = tables::decision_schema();
        assert_eq!(schema.fields().len(), 11);
        assert!(schema.field_with_name("rule").is_ok());
        assert!(schema.field_with_name("primary_signal").is_ok());
    }

    #[test]
    fn firm_and_audit_schemas_have_expected_fields() {
        assert_eq!(tables::firm_schema().fields().len(), 3);
        let audit = tables::audit_schema();
        assert_eq!(audit.fields().len(), 4);
        assert!(audit.field_with_name("kind").is_ok());
    }
}
