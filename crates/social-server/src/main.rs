use std::env;

use social_server::ServerBuilder;
use social_server::config::loader::{DEFAULT_CONFIG_PATH, load_config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(e) if e.not_found() => {}
        Err(e) => eprintln!("Warning: ignoring .env: {e}"),
    }

    social_server::observability::init_tracing();

    let (config_path, source) = config_path(env::args().skip(1), env::var("SOCIAL_CONFIG").ok());
    let cfg = match load_config(Some(&config_path)) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error in {config_path}: {e}");
            std::process::exit(2);
        }
    };
    social_server::observability::apply_logging_level(&cfg.logging.level);

    tracing::info!(
        path = %config_path,
        source,
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("GIT_COMMIT"),
        "Starting social-server"
    );

    ServerBuilder::new().with_config(cfg).build().await?.run().await
}

/// Picks the config file: `--config <path>` or `--config=<path>`, then
/// `SOCIAL_CONFIG`, then `social.toml`.
fn config_path(
    mut args: impl Iterator<Item = String>,
    from_env: Option<String>,
) -> (String, &'static str) {
    while let Some(arg) = args.next() {
        if let Some(path) = arg.strip_prefix("--config=") {
            return (path.to_string(), "cli");
        }
        if arg == "--config" {
            if let Some(path) = args.next() {
                return (path, "cli");
            }
        }
    }
    match from_env {
        Some(path) if !path.is_empty() => (path, "env"),
        _ => (DEFAULT_CONFIG_PATH.to_string(), "default"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter().map(|s| s.to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn config_path_precedence() {
        let env = Some("from-env.toml".to_string());

        assert_eq!(
            config_path(args(&["--config", "a.toml"]), env.clone()),
            ("a.toml".to_string(), "cli")
        );
        assert_eq!(
            config_path(args(&["--config=b.toml"]), env.clone()),
            ("b.toml".to_string(), "cli")
        );
        assert_eq!(
            config_path(args(&[]), env),
            ("from-env.toml".to_string(), "env")
        );
        assert_eq!(
            config_path(args(&["--config"]), Some(String::new())),
            (DEFAULT_CONFIG_PATH.to_string(), "default")
        );
    }
}
