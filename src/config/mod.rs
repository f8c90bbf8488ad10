pub mod schema;

pub use schema::{
    CONFIG_FILE_NAME, Config, GithubConfig, ReportingConfig, RetrieverConfig, RouterConfig,
    ValidatorConfig, WatchConfig,
};
