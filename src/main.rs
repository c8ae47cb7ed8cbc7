//! lg - command line front end for the lineage dependency graph.

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use lineage::{DagState, NewNode, Node, Status, TaskRecord, parse_task_file};
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};

mod cli;
mod storage;

use cli::{Cli, Command};
use storage::StateFile;

fn setup_logging() -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lineage")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("lineage.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn format_status(status: Status) -> ColoredString {
    match status {
        Status::Pending => "pending".normal(),
        Status::Active => "active".yellow(),
        Status::Valid => "valid".green(),
        Status::Stale => "stale".red(),
    }
}

fn print_node_line(node: &Node) {
    let tags = if node.tags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", node.tags.join(", "))
    };
    println!(
        "  {} {} {} {}{}",
        format_status(node.status),
        node.id.cyan(),
        node.node_type.as_str().dimmed(),
        node.title,
        tags.dimmed()
    );
}

fn print_nodes(nodes: &[&Node], heading: &str, empty: &str) {
    if nodes.is_empty() {
        println!("{}", empty.dimmed());
        return;
    }
    println!("{} {} {}:", "→".blue(), nodes.len(), heading);
    for node in nodes {
        print_node_line(node);
    }
}

fn print_ids(state: &DagState, ids: &[&str]) {
    for id in ids {
        match state.get(id) {
            Some(node) => print_node_line(node),
            None => println!("  {}", id.cyan()),
        }
    }
}

/// Parse every task file in `dir`, sorted by file name.
fn read_task_dir(dir: &Path) -> Result<Vec<TaskRecord>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read task directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "md"))
        .collect();
    paths.sort();

    let mut records = Vec::new();
    for path in paths {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string();
        let content = fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        match parse_task_file(&content, &name) {
            Some(record) => records.push(record),
            None => warn!("skipping {}: not a NNN_slug.md task file", name),
        }
    }
    Ok(records)
}

fn run(cli: Cli) -> Result<()> {
    let file = StateFile::new(&cli.file);

    match cli.command {
        Command::Init => {
            file.init().context("Failed to initialize graph")?;
            println!("{} Initialized graph at {}", "✓".green(), file.path().display());
        }

        Command::Add {
            id,
            node_type,
            title,
            deps,
            tags,
            notes,
        } => {
            let mut state = file.load()?;
            let mut request = NewNode::new(&id, node_type, &title).depends_on(deps).tags(tags);
            if let Some(notes) = notes {
                request = request.notes(notes);
            }
            let event = state.add_node_with(request).context("Failed to add node")?;
            file.commit(&state, &[event])?;

            println!("{} Added: {} {}", "✓".green(), id.cyan(), title);
        }

        Command::Dep { from, to } => {
            let mut state = file.load()?;
            let event = state.add_dependency(&from, &to).context("Failed to add dependency")?;
            file.commit(&state, &[event])?;

            println!("{} {} now depends on {}", "✓".green(), from.cyan(), to.cyan());
        }

        Command::Undep { from, to } => {
            let mut state = file.load()?;
            match state.remove_dependency(&from, &to).context("Failed to remove dependency")? {
                Some(event) => {
                    file.commit(&state, &[event])?;
                    println!("{} {} no longer depends on {}", "✓".green(), from.cyan(), to.cyan());
                }
                None => println!("{}", format!("{} does not depend on {}", from, to).dimmed()),
            }
        }

        Command::SetStatus { id, status } => {
            let mut state = file.load()?;
            let event = state.set_status(&id, status).context("Failed to set status")?;
            file.commit(&state, &[event])?;

            let version = state.get(&id).map(|n| n.version).unwrap_or_default();
            println!("{} {} is now {} (v{})", "✓".green(), id.cyan(), format_status(status), version);
        }

        Command::Invalidate { id } => {
            let mut state = file.load()?;
            let events = state.invalidate(&id).context("Failed to invalidate")?;
            file.commit(&state, &events)?;

            if events.is_empty() {
                println!("{}", "Nothing to invalidate".dimmed());
            } else {
                println!("{} {} node(s) marked stale:", "⊘".red(), events.len());
                for event in &events {
                    println!("  {}", event.node_id.cyan());
                }
            }
        }

        Command::Claim { id } => {
            let mut state = file.load()?;
            let event = state.claim_task(&id).context("Failed to claim task")?;
            file.commit(&state, &[event])?;

            println!("{} Claimed: {}", "→".blue(), id.cyan());
        }

        Command::Show { id } => {
            let state = file.load()?;
            let Some(node) = state.get(&id) else {
                eprintln!("{} Node not found: {}", "✗".red(), id);
                std::process::exit(1);
            };

            println!("{}: {}", "ID".bold(), node.id.cyan());
            println!("{}: {}", "Type".bold(), node.node_type);
            println!("{}: {}", "Title".bold(), node.title);
            println!("{}: {}", "Status".bold(), format_status(node.status));
            println!("{}: {}", "Version".bold(), node.version);
            if let Some(at) = &node.last_validated {
                println!("{}: {}", "Last Validated".bold(), at);
            }
            if !node.depends_on.is_empty() {
                println!("{}: {}", "Depends On".bold(), node.depends_on.join(", "));
            }
            let dependents = state.direct_dependents(&id);
            if !dependents.is_empty() {
                println!("{}: {}", "Dependents".bold(), dependents.join(", "));
            }
            if !node.tags.is_empty() {
                println!("{}: {}", "Tags".bold(), node.tags.join(", "));
            }
            if let Some(notes) = &node.notes {
                println!("{}: {}", "Notes".bold(), notes);
            }
        }

        Command::List { node_type, status, tag } => {
            let state = file.load()?;
            let nodes: Vec<&Node> = state
                .nodes()
                .filter(|n| node_type.is_none_or(|t| n.node_type == t))
                .filter(|n| status.is_none_or(|s| n.status == s))
                .filter(|n| tag.as_deref().is_none_or(|t| n.has_tag(t)))
                .collect();
            print_nodes(&nodes, "node(s)", "No nodes found");
        }

        Command::Plannable => {
            let state = file.load()?;
            print_nodes(&state.plannable(), "task(s) ready to start", "No plannable tasks");
        }

        Command::Blocked => {
            let state = file.load()?;
            let blocked = state.blocked();
            if blocked.is_empty() {
                println!("{}", "No blocked tasks".dimmed());
            } else {
                println!("{} {} task(s) blocked:", "⊘".red(), blocked.len());
                for node in blocked {
                    let waiting: Vec<String> = node
                        .depends_on
                        .iter()
                        .filter(|d| state.get(d).is_none_or(|dep| dep.status != Status::Valid))
                        .map(|d| match state.get(d) {
                            Some(dep) => format!("{} ({})", d, dep.status),
                            None => format!("{} (missing)", d),
                        })
                        .collect();
                    println!("  {} {} {}", node.id.cyan(), node.title, format!("<- {}", waiting.join(", ")).dimmed());
                }
            }
        }

        Command::Active => {
            let state = file.load()?;
            print_nodes(&state.active_tasks(), "task(s) in progress", "No active tasks");
        }

        Command::Waves => {
            let state = file.load()?;
            let plan = state.plan_waves();
            if plan.waves.is_empty() {
                println!("{}", "No plannable work".dimmed());
            }
            for (i, wave) in plan.waves.iter().enumerate() {
                println!("{} {}: {}", "Wave".bold(), i + 1, wave.join(", "));
            }
            if !plan.unreachable.is_empty() {
                println!("{} {}", "Unreachable:".red(), plan.unreachable.join(", "));
            }
        }

        Command::Stale => {
            let state = file.load()?;
            let stale = state.stale_nodes();
            if stale.is_empty() {
                println!("{}", "Nothing is stale".dimmed());
            } else {
                println!("{} {} stale node(s), in revalidation order:", "→".blue(), stale.len());
                print_ids(&state, &stale);
            }
        }

        Command::Validate => {
            let state = file.load()?;
            let report = state.validate();
            if report.is_empty() {
                println!("{} Graph is valid", "✓".green());
            }
            let mut errors = 0;
            for entry in &report {
                if entry.starts_with("ERROR") {
                    errors += 1;
                    println!("{}", entry.red());
                } else {
                    println!("{}", entry.yellow());
                }
            }
            if errors > 0 {
                eyre::bail!("validation found {} error(s)", errors);
            }
        }

        Command::Summary => {
            let state = file.load()?;
            print!("{}", state.summarize());
        }

        Command::Impact { id } => {
            let state = file.load()?;
            if !state.contains(&id) {
                eyre::bail!("node not found: {}", id);
            }
            let report = state.impact_analysis(&id);
            println!(
                "{} Invalidating {} would make {} node(s) stale",
                "→".blue(),
                id.cyan(),
                report.cascade_count()
            );
            let refs: Vec<&str> = report.affected.iter().map(String::as_str).collect();
            print_ids(&state, &refs);
        }

        Command::Order => {
            let state = file.load()?;
            match state.topological_order() {
                Some(order) => print_ids(&state, &order),
                None => eyre::bail!("graph contains a cycle; run 'lg validate'"),
            }
        }

        Command::CriticalPath => {
            let state = file.load()?;
            let path = state.critical_path();
            if path.is_empty() {
                println!("{}", "Graph is empty".dimmed());
            } else {
                println!("{} {}", format!("{} node(s):", path.len()).bold(), path.join(" -> "));
            }
        }

        Command::Orphans => {
            let state = file.load()?;
            let orphans = state.find_orphans();
            if orphans.is_empty() {
                println!("{}", "No orphans".dimmed());
            } else {
                print_ids(&state, &orphans);
            }
        }

        Command::Paths { from, to, max } => {
            let state = file.load()?;
            let paths = state.find_paths(&from, &to, max);
            if paths.is_empty() {
                println!("{}", format!("No path from {} to {}", from, to).dimmed());
            }
            for path in paths {
                println!("  {}", path.join(" -> "));
            }
        }

        Command::Subgraph { tag, node_type, depth } => {
            if tag.is_none() && node_type.is_none() {
                eyre::bail!("subgraph needs --tag or --type");
            }
            let state = file.load()?;
            let ids = state.subgraph(
                |n| {
                    tag.as_deref().is_none_or(|t| n.has_tag(t)) && node_type.is_none_or(|t| n.node_type == t)
                },
                depth,
            );
            print_ids(&state, &ids);
        }

        Command::Sync { dir } => {
            let mut state = file.load()?;
            let records = read_task_dir(&dir)?;
            let events = state.sync_tasks(&records).context("Failed to sync task files")?;
            file.commit(&state, &events)?;

            println!(
                "{} Synced {} task file(s), {} change(s)",
                "✓".green(),
                records.len(),
                events.len()
            );
        }

        Command::History { limit } => {
            let events = file.read_events()?;
            let skip = limit.map_or(0, |n| events.len().saturating_sub(n));
            if events.is_empty() {
                println!("{}", "No history".dimmed());
            }
            for event in &events[skip..] {
                let detail = match (&event.dependency, event.from, event.to) {
                    (Some(dep), _, _) => format!(" {}", dep),
                    (None, Some(from), Some(to)) => format!(" {} -> {}", from, to),
                    _ => String::new(),
                };
                println!(
                    "{} {} {}{}",
                    event.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
                    event.action.as_str(),
                    event.node_id.cyan(),
                    detail
                );
            }
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    info!("Command: {:?}", std::env::args().collect::<Vec<_>>());

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
