use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "opsboard-api", about = "Multi-tenant ticketing and project management API")]
struct Args {
    /// Port to listen on (falls back to PORT, then 3000)
    #[arg(long)]
    port: Option<u16>,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,
}

#[tokio::main]
async fn main() {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    let config = opsboard_api::config::config();
    tracing::info!("Starting Opsboard API in {:?} mode", config.environment);

    let args = Args::parse();
    let port = args
        .port
        .or_else(|| std::env::var("PORT").ok().and_then(|s| s.parse::<u16>().ok()))
        .unwrap_or(3000);

    let app = opsboard_api::app();

    let bind_addr = format!("{}:{}", args.bind, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {}", bind_addr, e));

    tracing::info!("Opsboard API listening on http://{}", bind_addr);

    axum::serve(listener, app).await.expect("server");
}
