use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::{Duration, SystemTime},
};

use aliri_base64::Base64Url;
use aliri_clock::UnixTime;
use async_trait::async_trait;
use clap::Parser;
use sso_stages::{Stage, StageRef};
use sso_tokens::{
    cached, sources::IdentityService, validity, AccessToken, Password, PasswordRef,
    RefreshToken, RemoteSignInError, TokenPair, Username, UsernameRef,
};
use tokio::time;

#[derive(Debug, Parser)]
struct Opts {
    /// The stage of the identity service
    #[arg(long, env = "SSO_STAGE", default_value = sso_stages::SANDBOX)]
    stage: Stage,

    /// The username to sign in with
    #[arg(short, long, env = "SSO_USERNAME")]
    username: Username,

    /// The password to sign in with
    #[arg(short, long, env = "SSO_PASSWORD", hide_env_values = true)]
    password: Password,

    /// Lifetime in seconds of the tokens minted by the local identity service
    #[arg(short, long, default_value_t = 330)]
    lifetime: u64,

    /// Seconds between sign-in attempts
    #[arg(short, long, default_value_t = 5)]
    interval: u64,
}

/// Mints unsigned tokens locally in place of the real identity service
#[derive(Debug)]
struct LocalIdentity {
    lifetime: u64,
    issued: AtomicUsize,
}

#[async_trait]
impl IdentityService for LocalIdentity {
    async fn sign_in(
        &self,
        stage: &StageRef,
        username: &UsernameRef,
        password: &PasswordRef,
    ) -> Result<TokenPair, RemoteSignInError> {
        if password.as_str().is_empty() {
            return Err(RemoteSignInError::rejected("empty password"));
        }

        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        let now = UnixTime::from(SystemTime::now());

        let header = Base64Url::from_raw(r#"{"alg":"none"}"#.as_bytes());
        let claims = Base64Url::from_raw(
            format!(
                r#"{{"sub":"{}","aud":"{}","iat":{},"exp":{}}}"#,
                username,
                stage,
                now.0,
                now.0 + self.lifetime
            )
            .into_bytes(),
        );

        Ok(TokenPair::new(
            AccessToken::from(format!("{}.{}.", header, claims)),
            RefreshToken::from(format!("refresh-{}", n)),
        ))
    }
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();

    let cache = cached::CachedSignIn::new(LocalIdentity {
        lifetime: opts.lifetime,
        issued: AtomicUsize::new(0),
    });
    cache.configure(cached::Config { stage: opts.stage });

    let mut interval = time::interval(Duration::from_secs(opts.interval));
    loop {
        interval.tick().await;

        cache.sign_in(&opts.username, &opts.password).await?;

        let tokens = cache.tokens();
        let (_, claims) = validity::decompose_unverified(tokens.access_token())?;
        tracing::info!(
            access_token = format_args!("{:#?}", tokens.access_token()),
            refresh_token = format_args!("{:#?}", tokens.refresh_token()),
            expiry = claims.exp.map(|e| e.0),
            "current tokens"
        );
    }
}
