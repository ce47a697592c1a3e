//! Postman broker entry point: CLI parsing, startup preparation, and the
//! server lifecycle (the original broker's `Prepare()` / `StartServer()` /
//! `GracefulShutdown()` translated into an async `main`).

use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;

use clap::Parser;
use postman::cli::{split_list, Options};
use postman::config::{self, ServerConfig};
use postman::kv::RedbKvStore;
use postman::plugin::PluginManifest;
use postman::{NetworkConfig, NetworkModule};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let opts = Options::parse();
    init_tracing(opts.log_dir.as_deref());

    let host_ip = local_ipv4();

    // PaaS overrides: env vars take over the corresponding flags, and the
    // optional APIs are force-disabled, mirroring the original's
    // compile-time `TARGET_PAAS` branch.
    let (port, channels, ip_addresses, use_store_api, use_file_api, use_plugin_api) = if opts.paas_mode {
        (
            std::env::var(config::ENV_PORT).ok().and_then(|p| p.parse().ok()).unwrap_or(opts.port),
            std::env::var(config::ENV_CHLIST).unwrap_or_default(),
            std::env::var(config::ENV_IPLIST).unwrap_or_default(),
            false,
            false,
            false,
        )
    } else {
        (opts.port, opts.channels.clone(), opts.ip_addresses.clone(), opts.use_store_api, opts.use_file_api, opts.use_plugin_api)
    };

    // Don't start a second instance on the same port.
    if std::net::TcpListener::bind(("0.0.0.0", port)).is_err() {
        eprintln!("> [Warning] don't start multiple instance");
        std::process::exit(1);
    }

    let secret = std::env::var(config::ENV_SECRET).unwrap_or_default();

    if opts.gen_token {
        if secret.is_empty() {
            eprintln!("environment variable [{}] is empty", config::ENV_SECRET);
            std::process::exit(1);
        }
        match postman::auth::generate_token(&secret, &host_ip) {
            Ok(token) => {
                println!("genarated token: {token}");
                std::process::exit(0);
            }
            Err(e) => {
                eprintln!("failed to generate token: {e}");
                std::process::exit(1);
            }
        }
    }

    if opts.secure_mode && secret.is_empty() {
        eprintln!("secure mode requires environment variable [{}]", config::ENV_SECRET);
        std::process::exit(1);
    }

    let channel_safelist = split_list(&channels);
    let ip_allowlist: Vec<String> = split_list(&ip_addresses).into_iter().filter(|ip| ip.parse::<std::net::Ipv4Addr>().is_ok()).collect();

    let mut server_config = ServerConfig {
        ip_allowlist,
        channel_safelist,
        secure_mode: opts.secure_mode,
        secret,
        host_key: host_ip.clone(),
        use_store_api,
        use_file_api,
        use_plugin_api,
        paas_mode: opts.paas_mode,
        mask_ips: opts.paas_mode,
        ..ServerConfig::default()
    };
    if let Some(log_dir) = opts.log_dir.clone() {
        server_config.log_dir = Some(log_dir);
    }

    let network_config = NetworkConfig {
        port,
        ..NetworkConfig::default()
    };

    let mut module = NetworkModule::new(network_config, server_config.clone());

    if server_config.use_store_api {
        match RedbKvStore::open(&server_config.db_path) {
            Ok(store) => module = module.with_kv_store(Arc::new(store)),
            Err(e) => warn!(error = %e, "key-value store disabled: could not open database"),
        }
    }

    if server_config.use_plugin_api {
        match PluginManifest::load_or_init(&server_config.plugin_dir).await {
            Ok(manifest) => module = module.with_plugins(Arc::new(manifest)),
            Err(e) => warn!(error = %e, "plugin api disabled: could not load manifest"),
        }
    }

    if server_config.use_file_api {
        if let Err(e) = std::fs::create_dir_all(&server_config.serve_files_dir) {
            warn!(error = %e, dir = %server_config.serve_files_dir.display(), "could not create file-serving directory");
        }
    }

    let port = match module.start().await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("failed to bind listener: {e}");
            std::process::exit(1);
        }
    };

    print_banner(&host_ip, port, &server_config);

    let shutdown = async {
        tokio::signal::ctrl_c().await.expect("failed to listen for ctrl-c");
        info!("received shutdown signal");
    };

    if let Err(e) = module.serve(shutdown).await {
        eprintln!("server error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(log_dir: Option<&std::path::Path>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("postman=info,tower_http=info"));

    if let Some(dir) = log_dir {
        let file_appender = tracing_appender::rolling::daily(dir, "postman.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // Leaking the guard is intentional: it must live for the process
        // lifetime to flush buffered log lines on exit.
        std::mem::forget(guard);
        tracing_subscriber::fmt().with_env_filter(filter).with_writer(non_blocking).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Resolves the server's own non-loopback IPv4 address, used as the host
/// identifier embedded in and checked against token claims. Ported from
/// the original broker's `GetHostIP`, which enumerates interface
/// addresses; connecting a UDP socket is the standard way to ask the OS
/// which local address would be used to reach the outside world, without
/// sending any packet.
fn local_ipv4() -> String {
    UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map(|addr: SocketAddr| addr.ip().to_string())
        .unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn print_banner(host: &str, port: u16, config: &ServerConfig) {
    let token_suffix = |suffix: &str| if config.secure_mode { suffix } else { "" };

    println!("===================================================");
    println!("[[ Postman v{} ]]", config::VERSION);
    println!("websocket server start... ws://{host}:{port}/postman{}", token_suffix("?tkn=TOKEN"));
    println!();
    println!("=== Websocket API ===");
    println!("[Ping]\n<- \"ping {{}}\"");
    println!("[Status]\n<- \"status {{}}\"");
    println!("[Subscribe]\n<- \"subscribe {{\"ch\":\"CHANNEL\",[\"ci\":\"CLIENT_INFO\"]}}\"");
    println!("[Unsubscribe]\n<- \"unsubscribe {{\"ch\":\"CHANNEL\"}}\"");
    println!("[Publish]\n<- \"publish {{\"ch\":\"CHANNEL\",\"msg\":\"MESSAGE\",[\"tag\":\"TAG\",\"ext\":\"OTHER\"]}}\"");
    println!();
    println!("=== Http API ===");
    println!("http://{host}:{port}/postman");
    println!("[Status]");
    println!("(GET) /postman/status{}", token_suffix("?tkn=TOKEN"));
    println!("(GET) /postman/status_pp{}", token_suffix("?tkn=TOKEN"));
    println!("[Publish]");
    println!(
        "(GET) /postman/publish?ch=CHANNEL&msg=MESSAGE[&tag=TAG&ext=OTHER&ci=CLIENT_INFO]{}",
        token_suffix("&tkn=TOKEN")
    );
    if config.use_store_api {
        println!("[Store]");
        println!("(GET) /postman/store?cmd=(get|set|has|delete)&key=KEY[&val=VALUE]{}", token_suffix("&tkn=TOKEN"));
    }
    if config.use_file_api {
        println!("[File]");
        println!("(GET) /postman/file/FILE_NAME{}", token_suffix("?tkn=TOKEN"));
    }
    if config.use_plugin_api {
        println!("[Plugin]");
        println!("(GET) /postman/plugin?cmd=COMMAND{}", token_suffix("&tkn=TOKEN"));
    }
    println!("===================================================");
    println!();
}
