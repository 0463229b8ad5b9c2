//! Line-oriented probe for the session engine: connects a profile
//! described by TETHER_* environment variables, pumps stdin/stdout
//! through the interactive channel, and can list or attach tmux
//! sessions. A debug surface, not a terminal renderer.

use anyhow::{bail, Context, Result};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

use tether::{
    AuthMethod, ConnectionManager, ConnectionProfile, MemorySecretStore, SecretKind, TmuxDirectory,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let (profile, secrets) = profile_from_env()?;

    let manager = ConnectionManager::new();
    let session = manager.get_or_create(&profile.profile_id);
    let directory = TmuxDirectory::new(secrets);

    // Register the consumer before connecting so the login banner lands
    // in the buffer, not on the floor.
    session.set_on_data(|bytes| {
        let mut stdout = std::io::stdout();
        let _ = stdout.write_all(bytes);
        let _ = stdout.flush();
    });

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("--list") => {
            let records = directory.list_sessions(&session, &profile).await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
            manager.disconnect_all();
            return Ok(());
        }
        Some("--attach") => {
            let name = args
                .next()
                .context("--attach requires a session name")?;
            directory.attach(&session, &profile, &name).await?;
        }
        Some(other) => bail!("unknown argument: {}", other),
        None => directory.connect(&session, &profile).await?,
    }

    // Pump stdin lines into the remote shell until EOF or Ctrl-C.
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => match line? {
                Some(line) => {
                    session.send_text(&line);
                    session.send(b"\r".as_slice());
                }
                None => break,
            },
        }
    }

    manager.disconnect_all();
    Ok(())
}

fn profile_from_env() -> Result<(ConnectionProfile, MemorySecretStore)> {
    let hostname = std::env::var("TETHER_HOST").context("TETHER_HOST is not set")?;
    let username = std::env::var("TETHER_USER").context("TETHER_USER is not set")?;
    let port = match std::env::var("TETHER_PORT") {
        Ok(raw) => raw.parse().context("TETHER_PORT is not a valid port")?,
        Err(_) => 22,
    };

    let profile_id = format!("{}@{}:{}", username, hostname, port);
    let secrets = MemorySecretStore::new();

    let auth_method = if let Ok(path) = std::env::var("TETHER_KEY_FILE") {
        let key = std::fs::read(&path).with_context(|| format!("reading key file {}", path))?;
        secrets.store_secret(&profile_id, SecretKind::PrivateKey, key);
        AuthMethod::Key
    } else {
        let password = std::env::var("TETHER_PASSWORD")
            .context("set TETHER_PASSWORD or TETHER_KEY_FILE")?;
        secrets.store_secret(&profile_id, SecretKind::Password, password);
        AuthMethod::Password
    };

    let profile = ConnectionProfile::new(
        profile_id,
        hostname.clone(),
        hostname,
        port,
        username,
        auth_method,
    );
    Ok((profile, secrets))
}
