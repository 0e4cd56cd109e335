//! CLI command implementations.

use crate::config::{MirrorConfig, Remote};
use anyhow::{anyhow, Context, Result};
use repligit::{blocking, Client, HttpTransport, ObjectId, RefMap, RefUpdate};
use std::time::Duration;

/// What mirroring one ref requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefPlan {
    /// The destination already has the source's commit.
    UpToDate,
    /// The destination must be updated.
    Update(RefUpdate),
}

/// Decides how to mirror `ref_name` from the two advertisements.
pub fn plan_ref(ref_name: &str, source: &RefMap, destination: &RefMap) -> Result<RefPlan> {
    let want = source
        .get(ref_name)
        .ok_or_else(|| anyhow!("{ref_name} not found on source"))?;

    if destination.values().any(|id| id == want) {
        return Ok(RefPlan::UpToDate);
    }

    let old = destination
        .get(ref_name)
        .cloned()
        .unwrap_or_else(ObjectId::zero);
    Ok(RefPlan::Update(RefUpdate::new(ref_name, old, want.clone())))
}

/// Formats refs as `<id>\t<name>`, sorted by name.
pub fn format_refs(refs: &RefMap) -> Vec<String> {
    let mut entries: Vec<_> = refs.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
        .into_iter()
        .map(|(name, id)| format!("{id}\t{name}"))
        .collect()
}

fn short(id: &ObjectId) -> &str {
    &id.as_str()[..7]
}

fn report_update(update: &RefUpdate) {
    println!(
        "{}: {} -> {}",
        update.ref_name,
        short(&update.old),
        short(&update.new)
    );
}

fn client(timeout: Option<Duration>) -> Result<Client> {
    let transport = match timeout {
        Some(timeout) => HttpTransport::with_timeout(timeout)?,
        None => HttpTransport::new()?,
    };
    Ok(Client::with_transport(transport))
}

fn blocking_client(timeout: Option<Duration>) -> Result<blocking::Client> {
    let transport = match timeout {
        Some(timeout) => blocking::HttpTransport::with_timeout(timeout)?,
        None => blocking::HttpTransport::new()?,
    };
    Ok(blocking::Client::with_transport(transport))
}

/// List a remote's refs.
pub async fn ls_remote(remote: &Remote, timeout: Option<Duration>) -> Result<()> {
    let credentials = remote.credentials()?;
    let refs = client(timeout)?
        .discover_refs(&remote.url, credentials.as_ref())
        .await
        .with_context(|| format!("failed to list refs of {}", remote.url))?;
    for line in format_refs(&refs) {
        println!("{line}");
    }
    Ok(())
}

/// List a remote's refs on the blocking client.
pub fn ls_remote_blocking(remote: &Remote, timeout: Option<Duration>) -> Result<()> {
    let credentials = remote.credentials()?;
    let refs = blocking_client(timeout)?
        .discover_refs(&remote.url, credentials.as_ref())
        .with_context(|| format!("failed to list refs of {}", remote.url))?;
    for line in format_refs(&refs) {
        println!("{line}");
    }
    Ok(())
}

/// Mirror the configured refs.
pub async fn mirror(config: &MirrorConfig, timeout: Option<Duration>) -> Result<()> {
    let client = client(timeout)?;
    let source_creds = config.source.credentials()?;
    let dest_creds = config.destination.credentials()?;

    for ref_name in &config.refs {
        let (source, destination) = tokio::try_join!(
            client.discover_refs(&config.source.url, source_creds.as_ref()),
            client.discover_refs(&config.destination.url, dest_creds.as_ref()),
        )
        .context("ref discovery failed")?;

        let update = match plan_ref(ref_name, &source, &destination)? {
            RefPlan::UpToDate => {
                tracing::info!(ref_name = %ref_name, "up to date");
                println!("{ref_name}: up to date");
                continue;
            }
            RefPlan::Update(update) => update,
        };

        let pack = client
            .fetch_pack(
                &config.source.url,
                &update.new,
                destination.values(),
                source_creds.as_ref(),
            )
            .await
            .with_context(|| format!("failed to fetch {ref_name}"))?;
        let Some(pack) = pack else {
            println!("{ref_name}: source sent no packfile, skipped");
            continue;
        };

        tracing::info!(ref_name = %ref_name, bytes = pack.len(), "pushing");
        client
            .send_pack(&config.destination.url, &update, pack, dest_creds.as_ref())
            .await
            .with_context(|| format!("failed to push {ref_name}"))?;
        report_update(&update);
    }
    Ok(())
}

/// Mirror the configured refs on the blocking client.
///
/// The packfile is streamed from the source response into the push.
pub fn mirror_blocking(config: &MirrorConfig, timeout: Option<Duration>) -> Result<()> {
    let client = blocking_client(timeout)?;
    let source_creds = config.source.credentials()?;
    let dest_creds = config.destination.credentials()?;

    for ref_name in &config.refs {
        let source = client.discover_refs(&config.source.url, source_creds.as_ref())?;
        let destination = client.discover_refs(&config.destination.url, dest_creds.as_ref())?;

        let update = match plan_ref(ref_name, &source, &destination)? {
            RefPlan::UpToDate => {
                tracing::info!(ref_name = %ref_name, "up to date");
                println!("{ref_name}: up to date");
                continue;
            }
            RefPlan::Update(update) => update,
        };

        let pack = client
            .fetch_pack(
                &config.source.url,
                &update.new,
                destination.values(),
                source_creds.as_ref(),
            )
            .with_context(|| format!("failed to fetch {ref_name}"))?;
        let Some(pack) = pack else {
            println!("{ref_name}: source sent no packfile, skipped");
            continue;
        };

        client
            .send_pack(&config.destination.url, &update, pack, dest_creds.as_ref())
            .with_context(|| format!("failed to push {ref_name}"))?;
        report_update(&update);
    }
    Ok(())
}
