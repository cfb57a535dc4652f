//! Serves the login router against a real OpenID provider.
//!
//! Required environment: `OIDC_ISSUER`, `OIDC_CLIENT_ID`, `OIDC_REDIRECT_URI`. Optional:
//! `OIDC_CLIENT_SECRET`, `OIDC_COOKIE_KEY` (at least 64 bytes), `LISTEN_ADDR`.

// std
use std::{env, sync::Arc};
// crates.io
use axum_extra::extract::cookie::Key;
use color_eyre::{Result, eyre::WrapErr};
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
// self
use oidc_session_broker::{
	config::ClientConfig,
	flows::ReqwestOidcClient,
	session::{MemorySessionStore, SessionStore},
	web::{self, WebSettings},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	tracing_subscriber::registry()
		.with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
		.with(tracing_subscriber::fmt::layer())
		.init();

	let mut builder = ClientConfig::builder(
		env::var("OIDC_ISSUER").wrap_err("OIDC_ISSUER is required")?,
		env::var("OIDC_CLIENT_ID").wrap_err("OIDC_CLIENT_ID is required")?,
	)
	.redirect_uri(env::var("OIDC_REDIRECT_URI").wrap_err("OIDC_REDIRECT_URI is required")?);

	if let Ok(secret) = env::var("OIDC_CLIENT_SECRET") {
		builder = builder.client_secret(secret);
	}

	let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::default());
	let client = ReqwestOidcClient::new(builder.build()?, sessions)?;
	let key = match env::var("OIDC_COOKIE_KEY") {
		Ok(raw) => Key::try_from(raw.as_bytes())?,
		Err(_) => Key::generate(),
	};
	let listen = env::var("LISTEN_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".into());
	let settings = WebSettings::new(key).with_secure(!listen.starts_with("127.0.0.1"));
	let listener = TcpListener::bind(&listen).await?;

	tracing::info!(%listen, "Login server ready; open /login to start.");

	axum::serve(listener, web::router(Arc::new(client), settings)).await?;

	Ok(())
}
