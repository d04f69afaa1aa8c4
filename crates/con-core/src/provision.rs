//! Provisioning plan.
//!
//! A pure function from configuration to the ordered shell commands that
//! install the fleet: groups, system users, the directory tree, default
//! ACLs, SSH keys, sudoers, contract files, state-repo initialization, the
//! outer-inbox watcher, and the optional status dashboard. Nothing here
//! executes; the CLI runs the plan command by command and keeps going on
//! failure because provisioning is idempotent.

use std::fmt::Write as _;

use crate::config::{Config, Tier};
use crate::layout::{agent_user, Layout};

/// Supplementary group for a tier.
fn tier_group(tier: Tier) -> &'static str {
    match tier {
        Tier::Officer => "officers",
        Tier::Operator => "operators",
        Tier::Worker => "workers",
    }
}

/// Produce the ordered provisioning command list.
#[must_use]
pub fn plan_provision(cfg: &Config, layout: &Layout) -> Vec<String> {
    let mut cmds: Vec<String> = Vec::new();
    let env_file = layout.env_file().display().to_string();

    // Groups: the shared agents group, tier groups, the trusted group, and
    // one can-task group per agent controlling who may write its inbox.
    for group in ["agents", "officers", "operators", "workers"] {
        cmds.push(format!("groupadd -f {group}"));
    }
    cmds.push(format!("groupadd -f {}", cfg.system.trusted_group));
    for agent in &cfg.agents {
        cmds.push(format!("groupadd -f can-task-{}", agent.name));
    }

    // Only root reads the env file; agents receive its variables through
    // systemd EnvironmentFile= injection.
    cmds.push(format!("chmod 600 {env_file} 2>/dev/null || true"));
    cmds.push(format!("chown root:root {env_file} 2>/dev/null || true"));

    // System users, home 0700.
    for agent in &cfg.agents {
        let user = agent_user(&agent.name);
        let home = layout.home_root.join(&user).display().to_string();
        cmds.push(format!(
            "useradd -r -m -d {home} -s /bin/bash -g agents -G agents,{tier} {user} || true",
            tier = tier_group(agent.tier),
        ));
        // useradd -m only creates homes for new users; pre-created users
        // still need the directory.
        cmds.push(format!("install -d -o {user} -g agents -m 700 {home}"));
    }

    // Outer configuration root.
    for dir in ["", "base", "roles", "groups", "scopes", "agents"] {
        cmds.push(format!(
            "install -d -m 755 {}",
            layout.config_root.join(dir).display()
        ));
    }

    // State root.
    cmds.push(format!("install -d -m 755 {}", layout.state_root.display()));
    cmds.push(format!(
        "install -d -o root -g agents -m 0770 {}",
        layout.outer_inbox().display()
    ));
    cmds.push(format!(
        "install -d -m 775 {}",
        layout.artifacts_dir().display()
    ));
    for dir in [
        layout.inner_config_root(),
        layout.inner_config_root().join("agents"),
        layout.contracts_dir(),
        layout.state_root.join("logs"),
        layout.audit_dir(),
        layout.status_dir(),
        layout.policy_dir(),
        layout.ledger_dir(),
    ] {
        cmds.push(format!("install -d -m 755 {}", dir.display()));
    }

    // Per-agent mailbox subtrees, 0700.
    for agent in &cfg.agents {
        let user = agent_user(&agent.name);
        for dir in [
            layout.agent_dir(&agent.name),
            layout.agent_inbox(&agent.name),
            layout.agent_outbox(&agent.name),
            layout.agent_workspace(&agent.name),
            layout.agent_skills(&agent.name),
            layout.agent_sessions(&agent.name),
            layout.agent_archive(&agent.name),
        ] {
            cmds.push(format!(
                "install -d -o {user} -g agents -m 700 {}",
                dir.display()
            ));
        }
    }

    // Default ACLs. Mode 700 means the router needs explicit traverse on
    // each base directory to reach the inbox below it.
    let router_user = agent_user(&cfg.system.router);
    for agent in &cfg.agents {
        if agent.name == cfg.system.router {
            continue;
        }
        cmds.push(format!(
            "setfacl -m u:{router_user}:x {}/",
            layout.agent_dir(&agent.name).display()
        ));
        cmds.push(format!(
            "setfacl -m u:{router_user}:rwx {}/",
            layout.agent_inbox(&agent.name).display()
        ));
    }
    for agent in cfg.agents.iter().filter(|a| a.has_sysadmin_role()) {
        let user = agent_user(&agent.name);
        cmds.push(format!(
            "setfacl -m u:{user}:rwx {}/",
            layout.inner_config_root().join("agents").display()
        ));
        cmds.push(format!(
            "setfacl -m u:{user}:rwx {}/",
            layout.contracts_dir().display()
        ));
        cmds.push(format!(
            "setfacl -m u:{user}:rwx {}/",
            layout.audit_dir().display()
        ));
    }
    // Every agent appends date-stamped audit entries.
    cmds.push(format!(
        "setfacl -m g:agents:rwx {}/",
        layout.audit_dir().display()
    ));

    // SSH access for the operator.
    if !cfg.infra.ssh_authorized_keys.is_empty() {
        cmds.push("install -d -m 700 /root/.ssh".to_string());
        for key in &cfg.infra.ssh_authorized_keys {
            cmds.push(format!(
                "grep -qxF '{key}' /root/.ssh/authorized_keys 2>/dev/null || echo '{key}' >> /root/.ssh/authorized_keys"
            ));
        }
        cmds.push("chmod 600 /root/.ssh/authorized_keys".to_string());
    }

    // Sudoers from profile, validated before use.
    cmds.push(format!(
        "cp {}/* /etc/sudoers.d/ 2>/dev/null || true",
        layout.config_root.join("sudoers.d").display()
    ));
    cmds.push("chmod 440 /etc/sudoers.d/con-* 2>/dev/null || true".to_string());
    cmds.push("visudo -c || echo 'warn: sudoers validation failed'".to_string());

    // Contract documents from the outer config.
    cmds.push(format!(
        "cp {}/*.yaml {}/ 2>/dev/null || true",
        layout.config_root.join("contracts").display(),
        layout.contracts_dir().display()
    ));
    cmds.push(format!(
        "cp -r {}/ {}/ 2>/dev/null || true",
        layout.config_root.join("contracts/scripts").display(),
        layout.contracts_dir().join("scripts").display()
    ));

    // State repo with an ignore set covering workspaces and secrets.
    cmds.push(format!(
        "cd {state} && git init && git config user.name 'con' && git config user.email 'con@localhost' && cat > .gitignore << 'GITIGNORE'\n\
         agents/*/workspace/\n\
         artifacts/\n\
         *.env\n\
         *.pem\n\
         *.key\n\
         GITIGNORE\n\
         git add -A && git commit -m 'initial state' --allow-empty || true",
        state = layout.state_root.display()
    ));

    // Outer inbox watcher: path unit firing `con route-inbox` as the router.
    let mut path_unit = String::new();
    let _ = write!(
        path_unit,
        "cat > /etc/systemd/system/con-outer-inbox.path << 'EOF'\n\
         [Unit]\n\
         Description=con outer inbox watcher\n\
         \n\
         [Path]\n\
         PathChanged={inbox}\n\
         MakeDirectory=yes\n\
         \n\
         [Install]\n\
         WantedBy=multi-user.target\n\
         EOF",
        inbox = layout.outer_inbox().display()
    );
    cmds.push(path_unit);

    let mut route_unit = String::new();
    let _ = write!(
        route_unit,
        "cat > /etc/systemd/system/con-outer-inbox.service << 'EOF'\n\
         [Unit]\n\
         Description=con outer inbox -> {router} inbox\n\
         \n\
         [Service]\n\
         Type=oneshot\n\
         User={router_user}\n\
         ExecStart={binary} route-inbox\n\
         EnvironmentFile=-{env_file}\n\
         EOF",
        router = cfg.system.router,
        binary = crate::units::BINARY,
    );
    cmds.push(route_unit);
    cmds.push("systemctl enable --now con-outer-inbox.path".to_string());

    // Status dashboard: static files over nginx, or teardown when disabled.
    if cfg.dashboard.enabled {
        cmds.push(format!(
            "cat > /etc/nginx/sites-available/con << 'EOF'\n\
             server {{\n    \
                 listen {bind}:{port};\n    \
                 root {status};\n    \
                 index index.html;\n    \
                 location / {{\n        \
                     limit_except GET HEAD {{ deny all; }}\n    \
                 }}\n\
             }}\n\
             EOF",
            bind = cfg.dashboard.bind,
            port = cfg.dashboard.port,
            status = layout.status_dir().display()
        ));
        cmds.push(
            "ln -sf /etc/nginx/sites-available/con /etc/nginx/sites-enabled/con".to_string(),
        );
        cmds.push("systemctl enable --now nginx".to_string());
    } else {
        cmds.push("systemctl disable --now nginx 2>/dev/null || true".to_string());
        cmds.push("rm -f /etc/nginx/sites-enabled/con".to_string());
    }

    cmds
}
