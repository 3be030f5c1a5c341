use clap::Parser;
use rsa::traits::PublicKeyParts;
use sso_jwks::{Config, KeyId, KeySetCache};
use sso_stages::Stage;

#[derive(Debug, Parser)]
struct Opts {
    /// The stage of the identity service to fetch keys from
    #[arg(long, env = "SSO_STAGE", conflicts_with = "url")]
    stage: Option<Stage>,

    /// An explicit key-set URL, used when no stage is given
    #[arg(long, env = "SSO_JWKS_URL")]
    url: Option<String>,

    /// The identifier of the key to look up
    #[arg(long)]
    kid: KeyId,
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

    let cache = KeySetCache::new()?;
    if let Some(stage) = opts.stage {
        cache.configure(Config { stage });
    } else if let Some(url) = opts.url {
        #[allow(deprecated)]
        cache.set_legacy_url(url);
    }

    tracing::info!(endpoint = %cache.endpoint(), "looking up key");

    let key = cache.lookup_key_id(&opts.kid).await?;
    let public_key = key.public_key()?;

    println!("kid:      {}", opts.kid);
    println!("alg:      {}", key.algorithm());
    println!("modulus:  {} bits", public_key.n().bits());
    println!("exponent: {}", public_key.e());

    Ok(())
}
