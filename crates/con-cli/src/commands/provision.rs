//! `con provision` — install the fleet.
//!
//! Runs the provisioning plan command by command (continuing on failure —
//! the plan is idempotent), writes the synthesized systemd units, enables
//! them per scheduling mode, compiles each agent's instruction document
//! into its home as a root-owned read-only file, and deploys role and
//! agent skill files into each workspace.

use std::path::Path;
use std::process::Command;

use anyhow::Result;
use con_core::assembler::{assemble, Layers};
use con_core::config::Mode;
use con_core::layout::agent_user;
use con_core::provision::plan_provision;
use con_core::units::{generate_healthcheck_units, generate_units};
use con_core::{Config, Layout};

const SYSTEMD_DIR: &str = "/etc/systemd/system";

/// Run a shell command with inherited stdio; report failure and keep going.
fn sh(command: &str) {
    match Command::new("sh").arg("-c").arg(command).status() {
        Ok(status) if status.success() => {}
        Ok(status) => eprintln!("command failed ({status}): {command}"),
        Err(err) => eprintln!("command failed: {command}: {err}"),
    }
}

pub fn provision(config: &Path, layout: &Layout) -> Result<()> {
    let cfg = Config::from_file(config)?;

    for command in plan_provision(&cfg, layout) {
        println!("+ {command}");
        sh(&command);
    }

    write_units(&cfg, layout);
    enable_units(&cfg);
    install_instructions(&cfg, layout);
    deploy_skills(&cfg, layout);

    println!("provision complete");
    Ok(())
}

fn write_units(cfg: &Config, layout: &Layout) {
    let systemd = Path::new(SYSTEMD_DIR);

    for agent in &cfg.agents {
        let Some(resolved) = cfg.resolved_agent(&agent.name) else {
            continue;
        };
        for (name, content) in generate_units(&resolved, layout) {
            let path = systemd.join(&name);
            println!("+ write {}", path.display());
            if let Err(err) = std::fs::write(&path, content) {
                eprintln!("writing {}: {err}", path.display());
            }
        }
    }

    for (name, content) in generate_healthcheck_units(&cfg.contracts.system.healthcheck_interval) {
        let path = systemd.join(&name);
        println!("+ write {}", path.display());
        if let Err(err) = std::fs::write(&path, content) {
            eprintln!("writing {}: {err}", path.display());
        }
    }
}

fn enable_units(cfg: &Config) {
    sh("systemctl daemon-reload");
    sh("systemctl enable --now con-healthcheck.timer");

    for agent in &cfg.agents {
        match agent.mode {
            Mode::OnDemand => sh(&format!("systemctl enable --now con-{}.path", agent.name)),
            Mode::Continuous => {
                sh(&format!("systemctl enable --now con-{}.service", agent.name));
            }
            Mode::Cron => {
                sh(&format!("systemctl enable --now con-{}.timer", agent.name));
                sh(&format!("systemctl enable --now con-{}.path", agent.name));
            }
        }
    }
}

/// Compile and install each agent's instruction document, root-owned and
/// read-only so the agent user cannot rewrite its own orders.
fn install_instructions(cfg: &Config, layout: &Layout) {
    for agent in &cfg.agents {
        let Some(resolved) = cfg.resolved_agent(&agent.name) else {
            continue;
        };
        let layers = Layers {
            outer_root: layout.config_root.clone(),
            inner_root: Some(layout.inner_config_root()),
            groups: resolved.groups.clone(),
            roles: resolved.roles.clone(),
            scopes: resolved.scopes.clone(),
            agent_name: resolved.name.clone(),
            inline_instructions: resolved.instructions.clone(),
        };

        let document = match assemble(&layers) {
            Ok(document) => document,
            Err(err) => {
                eprintln!("warning: instructions for {}: {err}", agent.name);
                continue;
            }
        };

        let path = layout.agent_instructions(&agent.name);
        println!("+ write {}", path.display());
        if let Err(err) = std::fs::write(&path, document) {
            eprintln!("writing {}: {err}", path.display());
            continue;
        }
        sh(&format!("chown root:root {}", path.display()));
        sh(&format!("chmod 0444 {}", path.display()));
    }
}

/// Copy role and agent-specific skill files into each workspace.
fn deploy_skills(cfg: &Config, layout: &Layout) {
    for agent in &cfg.agents {
        let skills_dir = layout.agent_skills(&agent.name);
        if let Err(err) = std::fs::create_dir_all(&skills_dir) {
            eprintln!("creating {}: {err}", skills_dir.display());
            continue;
        }

        let mut sources: Vec<std::path::PathBuf> = agent
            .roles
            .iter()
            .map(|role| layout.config_root.join("roles").join(role).join("skills"))
            .collect();
        sources.push(layout.config_root.join("agents").join(&agent.name).join("skills"));

        for source in sources {
            let Ok(entries) = std::fs::read_dir(&source) else {
                continue;
            };
            for entry in entries.flatten() {
                if entry.file_type().map(|t| t.is_dir()).unwrap_or(true) {
                    continue;
                }
                let dst = skills_dir.join(entry.file_name());
                match std::fs::copy(entry.path(), &dst) {
                    Ok(_) => println!(
                        "+ skill {} -> {}",
                        entry.file_name().to_string_lossy(),
                        dst.display()
                    ),
                    Err(err) => eprintln!("copying {}: {err}", entry.path().display()),
                }
            }
        }

        sh(&format!(
            "chown -R {}:agents {}",
            agent_user(&agent.name),
            skills_dir.display()
        ));
    }
}
