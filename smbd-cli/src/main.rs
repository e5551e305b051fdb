use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use smbd::auth::AcceptAllAuthenticator;
use smbd::config::{GlobalConfig, MapToGuest, ServerConfig, ShareConfig, UserConfig};
use smbd::idmap::UnixSidOracle;
use smbd::oplock::NullOplockBroker;
use smbd::pipe::NullPipeService;
use smbd::server::Collaborators;
use smbd::{Server, SigningPolicy};

mod cli;

use cli::{Cli, ShareSpec, UserSpec};

fn build_config(cli: &Cli) -> ServerConfig {
    let mut global = GlobalConfig {
        server_string: cli.server_string.clone(),
        workgroup: cli.workgroup.clone(),
        netbios_name: cli.netbios_name.clone(),
        server_signing: match cli.signing {
            cli::SigningMode::Disable => SigningPolicy::Disable,
            cli::SigningMode::Auto => SigningPolicy::Auto,
            cli::SigningMode::Mandatory => SigningPolicy::Mandatory,
        },
        ..GlobalConfig::default()
    };
    if cli.map_bad_user_to_guest {
        global.map_to_guest = MapToGuest::BadUser;
    }

    let mut config = ServerConfig::new(global);
    for ShareSpec {
        name,
        path,
        read_only,
        guest_ok,
    } in &cli.share
    {
        let mut share = ShareConfig::new(name.clone(), path.clone());
        share.read_only = *read_only;
        share.guest_ok = *guest_ok;
        share.store_dos_attr = cli.store_dos_attrs;
        config = config.with_share(share);
    }
    for UserSpec { name, uid, gid } in &cli.user {
        config = config.with_user(UserConfig {
            name: name.clone(),
            secret: Vec::new(),
            uid: *uid,
            gid: *gid,
            is_guest: false,
        });
    }
    config
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    if cli.share.is_empty() {
        return Err("at least one --share NAME:PATH is required".into());
    }

    let config = build_config(&cli);
    let server = Server::new(
        config,
        Collaborators {
            auth: Arc::new(AcceptAllAuthenticator),
            idmap: Arc::new(UnixSidOracle),
            oplocks: Arc::new(NullOplockBroker),
            pipes: Arc::new(NullPipeService),
        },
    );

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            log::info!("interrupt received, shutting down");
            shutdown.cancel();
        })?;
    }

    let listener = tokio::net::TcpListener::bind((cli.bind.as_str(), cli.port)).await?;
    server.run(listener, shutdown).await?;
    Ok(())
}
