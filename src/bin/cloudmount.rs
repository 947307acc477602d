//! Mount binary: wires config, logging, the remote client, the catalog
//! core and the `fuser` bridge together.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use cloudmount::adapter::VfsAdapter;
use cloudmount::catalog::FolderTree;
use cloudmount::config::{CliArgs, MountConfig};
use cloudmount::remote::http::HttpRemoteClient;
use cloudmount::remote::RemoteClient;

fn main() {
    cloudmount::logging::init();

    let config = match MountConfig::resolve(CliArgs::parse()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("cloudmount: {e}");
            std::process::exit(2);
        }
    };

    if !config.foreground {
        info!("daemonizing is not implemented yet; running in the foreground");
    }

    if let Err(e) = std::fs::create_dir_all(&config.staging_dir) {
        error!(error = %e, dir = %config.staging_dir.display(), "failed to create staging directory");
        std::process::exit(1);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to start the tokio runtime");
    let handle = runtime.handle().clone();

    let remote =
        Arc::new(HttpRemoteClient::new(config.api_base_url.clone(), config.api_key.clone()));
    let account_id = match handle.block_on(remote.account_id()) {
        Ok(id) => id,
        Err(e) => {
            error!(error = %e, "failed to authenticate with the remote");
            std::process::exit(1);
        }
    };
    info!(account_id, "authenticated");

    let tree = Arc::new(FolderTree::new(remote, config.staging_dir.clone(), account_id));
    if let Err(e) = handle.block_on(tree.load_or_bootstrap(&config.cache_file)) {
        error!(error = %e, "failed to load or bootstrap the catalog");
        std::process::exit(1);
    }

    let adapter = VfsAdapter::new(tree, handle, config.cache_file.clone());
    let options = [fuser::MountOption::FSName("cloudmount".to_string())];

    info!(mountpoint = %config.mountpoint.display(), "mounting");
    if let Err(e) = fuser::mount2(adapter, &config.mountpoint, &options) {
        error!(error = %e, "mount failed");
        std::process::exit(1);
    }
}
