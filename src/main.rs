use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use featurestore_sql::config::{self, ProviderConfig};
use featurestore_sql::connector::{MemorySqlClient, PoolRegistry, SqlClient};
use featurestore_sql::{FeatureProviderSql, FeatureQuery};

/// featurestore-sql - derive relational schemas and SQL for feature types
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Provider configuration (YAML)
    config_file: std::path::PathBuf,

    /// Only print this feature type
    #[arg(long = "type")]
    feature_type: Option<String>,

    /// CQL2 text filter, requires --type
    #[arg(long)]
    filter: Option<String>,

    /// Page size of the printed meta query, 0 uses the chunk size
    #[arg(long, default_value_t = 10)]
    limit: u32,

    #[arg(long, default_value_t = 0)]
    offset: u32,
}

impl From<Cli> for config::CliConfig {
    fn from(cli: Cli) -> Self {
        config::CliConfig {
            config_file: cli.config_file,
            feature_type: cli.feature_type,
            filter: cli.filter,
            limit: cli.limit,
            offset: cli.offset,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to INFO, can be overridden with RUST_LOG
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli: config::CliConfig = Cli::parse().into();
    if cli.filter.is_some() && cli.feature_type.is_none() {
        bail!("--filter requires --type");
    }

    println!("\nfeaturestore-sql v{}\n", env!("CARGO_PKG_VERSION"));

    let mut provider_config = ProviderConfig::from_yaml_file(&cli.config_file)
        .with_context(|| format!("Could not load {}", cli.config_file.display()))?;
    provider_config.connection_info.apply_env()?;

    // No database is contacted, queries are only rendered
    let client: Arc<dyn SqlClient> = Arc::new(MemorySqlClient::new());
    let provider = FeatureProviderSql::start(provider_config, &PoolRegistry::new(), move |_| client)?;

    let type_names: Vec<String> = match &cli.feature_type {
        Some(name) => vec![name.clone()],
        None => provider.type_names().into_iter().map(String::from).collect(),
    };

    for type_name in type_names {
        let root = provider.relational_schema(&type_name)?;
        println!("## {}\n", type_name);
        for node in root.nodes() {
            let columns: Vec<&str> = node.columns.iter().map(|column| column.name.as_str()).collect();
            println!("{} [{}]", node.path, columns.join(", "));
        }
        println!();

        let mut query = FeatureQuery::of(&type_name)
            .with_limit(u64::from(cli.limit))
            .with_offset(u64::from(cli.offset));
        if let Some(filter) = &cli.filter {
            query = query.with_filter(filter);
        }
        for sql in provider.explain(&query)? {
            println!("{};\n", sql);
        }
    }

    Ok(())
}
