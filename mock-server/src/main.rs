use std::sync::Arc;

use mock_server::{Crm, DEFAULT_PASSWORD_MD5, DEFAULT_USERNAME, REST_PATH};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let username = std::env::var("MOCK_USERNAME").unwrap_or_else(|_| DEFAULT_USERNAME.to_string());
    let password_md5 =
        std::env::var("MOCK_PASSWORD_MD5").unwrap_or_else(|_| DEFAULT_PASSWORD_MD5.to_string());

    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!("listening on http://{addr}{REST_PATH} as {username}");

    let db = Arc::new(RwLock::new(Crm::new(&username, &password_md5)));
    mock_server::run_with_db(listener, db).await
}
