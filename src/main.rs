//! MediaScout - command line host for site plugins
//!
//! Loads every plugin, then resolves a page URL or runs a search through the
//! matching plugin and prints what the plugin reports.

use std::rc::Rc;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use mediascout::core::{self, CliArgs, Command, Config, ErrorContext, ScoutError};
use mediascout::plugin::{
    ConsoleFrontend, Frontend, JsRuntimeWrapper, ManagerConfig, PluginManager, ReqwestClient, SessionCookies,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Load configuration (handles CLI args, env vars, and config file)
    let config = match Config::load(&args) {
        Ok(cfg) => cfg,
        Err(e) => {
            // Print error to stderr since logging isn't initialized yet
            let err = ScoutError::from(e);
            eprintln!("Failed to load configuration: {}", err);
            return Err(err.into());
        }
    };

    let _logger = match core::Logger::init(&config.logging) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return Err(e);
        }
    };

    info!("Starting MediaScout v{}", mediascout::VERSION);
    info!(
        system_dir = ?config.plugins.system_dir,
        user_dir = ?config.plugins.user_dir,
        extension = %config.plugins.extension,
        "Plugin configuration"
    );

    run(args.command, config).await
}

async fn run(command: Command, config: Config) -> Result<()> {
    let cookies = SessionCookies::new();
    let client = Arc::new(ReqwestClient::new(&config.network, &cookies)?);
    let frontend = Frontend::shared(Rc::new(ConsoleFrontend::new(config.ui.assume_yes)));

    let mut manager = PluginManager::<JsRuntimeWrapper>::new(
        ManagerConfig::from(&config),
        client,
        frontend,
        |bridge| JsRuntimeWrapper::new(bridge).context("Failed to create JavaScript runtime"),
    )?;

    // A plugin that fails to load ends the process
    let inventory = manager.discover(&config.plugins.search_dirs())?;

    match command {
        Command::List => {
            print!("{}", inventory);
            println!("Hosts:");
            for (host, plugin) in manager.registry().hosts() {
                println!("    {:<32} {}", host, plugin);
            }
            println!("Plugins:");
            for plugin in manager.registry().plugins() {
                let album = if plugin.has_search_album() { " (album search)" } else { "" };
                println!("    {}{}", plugin.name(), album);
            }
        }
        Command::Parse { url, download, cookies: cookie_file } => {
            manager.parse_url(&url, download)?;
            manager.run_until_idle().await;

            if let Some(path) = cookie_file {
                let page = Url::parse(&url).map_err(|e| ScoutError::InvalidArgument(e.to_string()))?;
                if cookies.save(&page, &path)? {
                    info!(path = %path.display(), "session cookies saved");
                } else {
                    warn!(url = %url, "no session cookies to save");
                }
            }
        }
        Command::Search { plugin, keyword, page, album } => {
            if album {
                manager.search_album(&plugin, &keyword, page)?;
            } else {
                manager.search(&plugin, &keyword, page)?;
            }
            manager.run_until_idle().await;
        }
    }

    let hints = manager.hints();
    info!(
        referers = hints.referers().len(),
        unseekable = ?hints.unseekable_hosts(),
        "Done"
    );
    Ok(())
}
