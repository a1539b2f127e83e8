//! Data set configuration
//!
//! Settings a [`DataSet`](crate::DataSet) starts with. Tables added later
//! inherit the comparison and enforcement settings unless they set their own
//! case sensitivity.

/// Initial settings of a data set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSetConfig {
    /// Data set name
    pub name: String,
    /// Namespace of the data set
    pub namespace: String,
    /// Compare strings case-sensitively in keys and lookups
    pub case_sensitive: bool,
    /// Check constraints on every mutation
    pub enforce_constraints: bool,
}

impl Default for DataSetConfig {
    fn default() -> Self {
        Self {
            name: "NewDataSet".to_string(),
            namespace: String::new(),
            case_sensitive: false,
            enforce_constraints: true,
        }
    }
}

impl DataSetConfig {
    /// Create a config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the namespace
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set case sensitivity
    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Set constraint enforcement
    pub fn enforce_constraints(mut self, enforce: bool) -> Self {
        self.enforce_constraints = enforce;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = DataSetConfig::default();
        assert_eq!(config.name, "NewDataSet");
        assert!(!config.case_sensitive);
        assert!(config.enforce_constraints);
    }

    #[test]
    fn test_config_builder() {
        let config = DataSetConfig::new()
            .name("orders")
            .namespace("urn:shop")
            .case_sensitive(true)
            .enforce_constraints(false);
        assert_eq!(config.name, "orders");
        assert_eq!(config.namespace, "urn:shop");
        assert!(config.case_sensitive);
        assert!(!config.enforce_constraints);
    }
}
