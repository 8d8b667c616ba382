use crate::error::Result;
use crate::plan::Plan;
use crate::session::Session;
use crate::storage::LocalStorage;
use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use std::env;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
pub struct ApplyArgs {
    /// Path to the TOML plan file
    pub plan: PathBuf,

    /// Directory the plan's paths are relative to (defaults to current directory)
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Run every step, then roll all of them back instead of committing
    #[arg(long, short = 'n')]
    pub dry_run: bool,
}

pub fn execute(args: ApplyArgs) -> Result<()> {
    // Parse and validate before anything touches the disk
    let plan = Plan::load(&args.plan)?;

    let root = match &args.root {
        Some(root) => root.clone(),
        None => env::current_dir()?,
    };
    let storage = LocalStorage::new(&root)
        .with_context(|| format!("Invalid root {}", root.display()))?;

    log::debug!(
        "Applying {} step(s) from {} in {}",
        plan.len(),
        args.plan.display(),
        root.display()
    );

    let session = Session::new(storage);
    session.begin()?;

    if let Err(e) = plan.apply(&session) {
        eprintln!("{} {}", "Error:".red().bold(), e);
        rollback(&session);
        return Err(e);
    }

    if args.dry_run {
        session.rollback()?;
    } else if let Err(e) = session.commit() {
        eprintln!("{} {}", "Error during commit:".red().bold(), e);
        log::warn!("Deletes completed before the failure cannot be undone");
        rollback(&session);
        return Err(e);
    }

    plan.print_summary(args.dry_run, &root);

    if !args.dry_run {
        println!(
            "{} {}",
            "✓ Applied".green().bold(),
            args.plan.display().to_string().green()
        );
    }

    Ok(())
}

fn rollback(session: &Session) {
    eprintln!("{}", "Attempting to rollback changes...".yellow().bold());
    match session.rollback() {
        Ok(()) => eprintln!("{}", "✓ Rollback successful.".green()),
        Err(rollback_err) => {
            eprintln!("{} {}", "✗ Rollback failed:".red().bold(), rollback_err);
        }
    }
}
