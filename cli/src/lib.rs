//! The `kiln` command line.
//!
//! ## Commands
//!
//! - `kiln fetch` downloads every locked release missing from the releases directory
//! - `kiln update-release --name <NAME> --version <VERSION>`
//! - `kiln update-stemcell --stemcell-file <TGZ>` (or `--os` and `--version`)
//! - `kiln sync-with-local --assume-release-source <ID>`
//! - `kiln missing-releases` prints `{"missing_releases": [...]}`
//! - `kiln find-release-version --release <NAME>` prints `{"version", "remote_path"}`
//! - `kiln upload-release --release-source <ID> --local-path <TGZ>`
//!
//! Reports go to the writer passed to [`run`]; logs go to stderr.

#![deny(clippy::print_stdout, clippy::print_stderr)]

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use kiln_fetcher::{MultiReleaseSource, SourceFactory};
use kiln_kilnfile::{Kilnfile, KilnfileLockStore, Stemcell, load_kilnfile};
use kiln_sync::{
    FetchOptions, StemcellInput, StemcellOutcome, SyncWithLocalOptions, UpdateOutcome,
    UpdateReleaseOptions, UpdateStemcellOptions,
};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "kiln", version, about = "Resolve, lock and fetch BOSH releases for a tile")]
pub struct Cli {
    /// Path to the Kilnfile; the lock is `<Kilnfile>.lock`.
    #[arg(long = "kilnfile", short = 'k', env = "KILNFILE", default_value = "Kilnfile", global = true)]
    pub kilnfile: PathBuf,

    /// Only use release sources marked `publishable: true`.
    #[arg(long = "allow-only-publishable-releases", global = true)]
    pub allow_only_publishable: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Download locked releases missing from the releases directory.
    Fetch(FetchArgs),
    /// Bump a release to a new version in the Kilnfile.lock.
    UpdateRelease(UpdateReleaseArgs),
    /// Move the Kilnfile.lock to a new stemcell.
    UpdateStemcell(UpdateStemcellArgs),
    /// Point the Kilnfile.lock at the releases in a local directory.
    SyncWithLocal(SyncWithLocalArgs),
    /// List locked releases missing from the releases directory, as JSON.
    MissingReleases(ReleasesDirArgs),
    /// Report the highest version of a release the Kilnfile allows, as JSON.
    FindReleaseVersion(FindReleaseVersionArgs),
    /// Upload a release tarball to a release source.
    UploadRelease(UploadReleaseArgs),
}

#[derive(Debug, Args)]
pub struct ReleasesDirArgs {
    /// Directory holding release tarballs.
    #[arg(
        long = "releases-directory",
        short = 'r',
        env = "KILN_RELEASES_DIRECTORY",
        default_value = "releases"
    )]
    pub releases_dir: PathBuf,
}

#[derive(Debug, Args)]
pub struct DownloadArgs {
    #[command(flatten)]
    pub dir: ReleasesDirArgs,

    /// Concurrent part downloads per release; 0 uses the backend default.
    #[arg(long = "download-threads", env = "KILN_DOWNLOAD_THREADS", default_value_t = 0)]
    pub download_threads: usize,
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    #[command(flatten)]
    pub download: DownloadArgs,

    /// Delete release tarballs the Kilnfile.lock doesn't ask for.
    #[arg(long = "delete-extra")]
    pub delete_extra: bool,

    /// Keep going after a failed release and report all failures at the end.
    #[arg(long = "keep-going")]
    pub keep_going: bool,
}

#[derive(Debug, Args)]
pub struct UpdateReleaseArgs {
    #[arg(long = "name", short = 'n')]
    pub name: String,

    /// Exact version, or a constraint such as `~1.2`.
    #[arg(long = "version", short = 'v')]
    pub version: String,

    #[command(flatten)]
    pub download: DownloadArgs,

    /// Record the new version without downloading it.
    #[arg(long = "without-download")]
    pub without_download: bool,
}

#[derive(Debug, Args)]
pub struct UpdateStemcellArgs {
    /// Stemcell tarball to read `stemcell.MF` from.
    #[arg(long = "stemcell-file", short = 's', conflicts_with_all = ["os", "version"])]
    pub stemcell_file: Option<PathBuf>,

    #[arg(long = "os", requires = "version")]
    pub os: Option<String>,

    #[arg(long = "version", requires = "os")]
    pub version: Option<String>,

    #[command(flatten)]
    pub download: DownloadArgs,
}

#[derive(Debug, Args)]
pub struct SyncWithLocalArgs {
    #[command(flatten)]
    pub dir: ReleasesDirArgs,

    /// Release source to record in updated entries.
    #[arg(long = "assume-release-source")]
    pub source_id: String,
}

#[derive(Debug, Args)]
pub struct FindReleaseVersionArgs {
    #[arg(long = "release", short = 'r')]
    pub release: String,
}

#[derive(Debug, Args)]
pub struct UploadReleaseArgs {
    /// ID of the release source in the Kilnfile.
    #[arg(long = "release-source")]
    pub release_source: String,

    /// Path to the release tarball.
    #[arg(long = "local-path")]
    pub local_path: PathBuf,
}

// ─────────────────────────────────────────────────────────────────────────────
// Dispatch
// ─────────────────────────────────────────────────────────────────────────────

/// Run one command, writing its report (if any) to `out`.
pub async fn run(cli: Cli, out: &mut impl Write) -> anyhow::Result<()> {
    let kilnfile = load_kilnfile(&cli.kilnfile)?;
    let store = KilnfileLockStore::for_kilnfile(&cli.kilnfile);

    match cli.command {
        Command::Fetch(args) => {
            if !cli.allow_only_publishable {
                tracing::warn!("fetching from all release sources; pass --allow-only-publishable-releases for releases you intend to ship");
            }
            let sources = build_sources(&kilnfile, cli.allow_only_publishable)?;
            cmd_fetch(&sources, &store, args).await
        }
        Command::UpdateRelease(args) => {
            let sources = build_sources(&kilnfile, cli.allow_only_publishable)?;
            cmd_update_release(&sources, &store, args).await
        }
        Command::UpdateStemcell(args) => {
            let sources = build_sources(&kilnfile, cli.allow_only_publishable)?;
            cmd_update_stemcell(&sources, &kilnfile, &store, args).await
        }
        Command::SyncWithLocal(args) => {
            let sources = build_sources(&kilnfile, cli.allow_only_publishable)?;
            let report = kiln_sync::sync_with_local(
                &sources,
                &store,
                &SyncWithLocalOptions {
                    releases_dir: args.dir.releases_dir,
                    source_id: args.source_id,
                },
            )?;
            tracing::info!(found = report.found, updated = report.updated.len(), "synced Kilnfile.lock with local releases");
            Ok(())
        }
        Command::MissingReleases(args) => {
            let lock = store.load()?;
            let report = kiln_sync::missing_releases(&lock, &args.releases_dir)?;
            write_json(out, &report)
        }
        Command::FindReleaseVersion(args) => {
            let sources = build_sources(&kilnfile, cli.allow_only_publishable)?;
            let lock = store.load()?;
            let report =
                kiln_sync::find_release_version(&sources, &kilnfile, &lock, &args.release).await?;
            write_json(out, &report)
        }
        Command::UploadRelease(args) => {
            let sources = build_sources(&kilnfile, cli.allow_only_publishable)?;
            let remote =
                kiln_sync::upload_release(&sources, &args.release_source, &args.local_path)
                    .await?;
            tracing::info!(release = %remote.id, remote_path = %remote.remote_path, "Upload succeeded");
            Ok(())
        }
    }
}

fn build_sources(kilnfile: &Kilnfile, allow_only_publishable: bool) -> anyhow::Result<MultiReleaseSource> {
    SourceFactory::new()
        .build_all(kilnfile, allow_only_publishable)
        .context("invalid release_sources in Kilnfile")
}

fn write_json(out: &mut impl Write, value: &impl Serialize) -> anyhow::Result<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Command implementations
// ─────────────────────────────────────────────────────────────────────────────

async fn cmd_fetch(
    sources: &MultiReleaseSource,
    store: &KilnfileLockStore,
    args: FetchArgs,
) -> anyhow::Result<()> {
    let options = FetchOptions {
        releases_dir: args.download.dir.releases_dir,
        download_threads: args.download.download_threads,
        delete_extra: args.delete_extra,
        keep_going: args.keep_going,
    };
    let report = kiln_sync::fetch(sources, store, &options).await?;
    tracing::info!(
        satisfied = report.satisfied.len(),
        downloaded = report.downloaded.len(),
        deleted = report.deleted.len(),
        "fetch complete"
    );
    Ok(())
}

async fn cmd_update_release(
    sources: &MultiReleaseSource,
    store: &KilnfileLockStore,
    args: UpdateReleaseArgs,
) -> anyhow::Result<()> {
    let mut options =
        UpdateReleaseOptions::new(args.name, args.version, args.download.dir.releases_dir);
    options.download_threads = args.download.download_threads;
    options.without_download = args.without_download;

    match kiln_sync::update_release(sources, store, &options).await? {
        UpdateOutcome::NoChange => tracing::info!("No changes made."),
        UpdateOutcome::Updated { current, .. } => {
            tracing::info!("Updated {} to {}. DON'T FORGET TO MAKE A COMMIT AND PR", current.name, current.version);
        }
    }
    Ok(())
}

async fn cmd_update_stemcell(
    sources: &MultiReleaseSource,
    kilnfile: &Kilnfile,
    store: &KilnfileLockStore,
    args: UpdateStemcellArgs,
) -> anyhow::Result<()> {
    let stemcell = stemcell_input(args.stemcell_file.as_deref(), args.os, args.version)?;
    let options = UpdateStemcellOptions {
        stemcell,
        releases_dir: args.download.dir.releases_dir,
        download_threads: args.download.download_threads,
    };
    match kiln_sync::update_stemcell(sources, kilnfile, store, &options).await? {
        StemcellOutcome::NotSatisfied { stemcell } => {
            tracing::info!("Nothing to update: {} {} does not satisfy the Kilnfile stemcell criteria", stemcell.os, stemcell.version);
        }
        StemcellOutcome::Unchanged => tracing::info!("No changes made."),
        StemcellOutcome::Updated { stemcell, releases, .. } => {
            tracing::info!(updated = ?releases, "Updated stemcell to {} {}", stemcell.os, stemcell.version);
        }
    }
    Ok(())
}

fn stemcell_input(
    file: Option<&Path>,
    os: Option<String>,
    version: Option<String>,
) -> anyhow::Result<StemcellInput> {
    match (file, os, version) {
        (Some(file), _, _) => Ok(StemcellInput::Archive(file.to_path_buf())),
        (None, Some(os), Some(version)) => Ok(StemcellInput::Explicit(Stemcell::new(os, version))),
        _ => anyhow::bail!("pass either --stemcell-file or both --os and --version"),
    }
}
