use std::path::PathBuf;

use thiserror::Error;

use crate::Group;

/// Fatal startup errors: the run cannot guess classification rules.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config table `{0}` is empty")]
    EmptyTable(&'static str),

    #[error("invalid CPC prefix {value:?} in `{table}`")]
    InvalidCpcPrefix { table: &'static str, value: String },

    #[error("invalid date {value:?} for `{field}`")]
    InvalidDate { field: &'static str, value: String },

    #[error("invalid value for `{field}`: {message}")]
    InvalidOption { field: &'static str, message: String },

    #[error("alias table entry {0:?} normalises to an empty firm name")]
    EmptyAlias(String),

    #[error("alias table contains a cycle through {0:?}")]
    AliasCycle(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("application {application_id} is already classified as {current}")]
    GroupAlreadySet {
        application_id: String,
        current: Group,
    },

    #[error("cannot assign group {0} to application {1}")]
    InvalidGroup(Group, String),

    #[error("office action for {0} already has a rejection signal")]
    SignalAlreadySet(String),
}
