//! systemd unit synthesis.
//!
//! Pure functions from an agent descriptor to unit-file text. Every agent
//! gets a `con-<name>.service`; its scheduling mode adds a `.path` watcher
//! (on-demand, cron), a calendar `.timer` (cron), or rewrites the service as
//! a long-running restart-on-failure variant (continuous). The hardening
//! block is selected by tier, except that agents carrying the `sysadmin`
//! role drop `NoNewPrivileges` and `ProtectSystem=strict` so commissioning
//! can escalate, and receive explicit write grants instead.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::config::{AgentConfig, Mode, Tier};
use crate::layout::{agent_unit, agent_user, Layout};

/// Path of the installed binary referenced by every unit.
pub const BINARY: &str = "/usr/local/bin/con";

/// Hardening directives for one agent service.
fn service_hardening(agent: &AgentConfig, layout: &Layout) -> String {
    let user = agent_user(&agent.name);
    let mut block = String::new();

    let _ = write!(
        block,
        "PrivateTmp=yes\n\
         PrivateDevices=yes\n\
         ProtectKernelTunables=yes\n\
         ProtectControlGroups=yes\n\
         ProtectHome=tmpfs\n\
         BindPaths={home}\n\
         BindPaths={agent_dir}\n\
         BindReadOnlyPaths={agents_root}\n\
         UMask=0077\n",
        home = layout.home_root.join(&user).display(),
        agent_dir = layout.agent_dir(&agent.name).display(),
        agents_root = layout.agents_root().display(),
    );

    if agent.has_sysadmin_role() {
        // Commissioning needs privilege escalation and write access to the
        // configuration surfaces; strict-system and no-new-privileges would
        // break sudo.
        let _ = write!(
            block,
            "ReadWritePaths={agents_root}\n\
             ReadWritePaths={inner_config}\n\
             ReadWritePaths={contracts}\n\
             ReadWritePaths={logs}\n\
             ReadWritePaths={config_root}\n\
             ReadWritePaths=/etc/sudoers.d\n\
             ReadWritePaths=/etc/systemd/system\n",
            agents_root = layout.agents_root().display(),
            inner_config = layout.inner_config_root().display(),
            contracts = layout.contracts_dir().display(),
            logs = layout.state_root.join("logs").display(),
            config_root = layout.config_root.display(),
        );
        return block;
    }

    block.push_str("NoNewPrivileges=yes\nProtectSystem=strict\n");

    if matches!(agent.tier, Tier::Officer | Tier::Operator) {
        let _ = write!(
            block,
            "ReadWritePaths={agents_root}\n\
             ReadWritePaths={artifacts}\n\
             ReadWritePaths={audit}\n\
             ReadWritePaths={policy}\n\
             ReadWritePaths={ledger}\n",
            agents_root = layout.agents_root().display(),
            artifacts = layout.artifacts_dir().display(),
            audit = layout.audit_dir().display(),
            policy = layout.policy_dir().display(),
            ledger = layout.ledger_dir().display(),
        );
    }

    block
}

fn service_unit(agent: &AgentConfig, layout: &Layout, continuous: bool) -> String {
    let user = agent_user(&agent.name);
    let exec = if continuous {
        format!("{BINARY} run {} --continuous", agent.name)
    } else {
        format!("{BINARY} run {}", agent.name)
    };
    let kind = if continuous {
        "Type=simple\nRestart=on-failure\nRestartSec=5"
    } else {
        "Type=oneshot"
    };

    format!(
        "[Unit]\n\
         Description=con agent: {name}\n\
         After=network.target\n\
         \n\
         [Service]\n\
         {kind}\n\
         User={user}\n\
         Group=agents\n\
         ExecStart={exec}\n\
         WorkingDirectory={workspace}\n\
         Environment=HOME={home}\n\
         EnvironmentFile=-{env_file}\n\
         {hardening}\
         [Install]\n\
         WantedBy=multi-user.target\n",
        name = agent.name,
        workspace = layout.agent_workspace(&agent.name).display(),
        home = layout.home_root.join(&user).display(),
        env_file = layout.env_file().display(),
        hardening = service_hardening(agent, layout),
    )
}

fn path_unit(agent: &AgentConfig, layout: &Layout) -> String {
    format!(
        "[Unit]\n\
         Description=con inbox watcher: {name}\n\
         \n\
         [Path]\n\
         PathChanged={inbox}\n\
         MakeDirectory=yes\n\
         \n\
         [Install]\n\
         WantedBy=multi-user.target\n",
        name = agent.name,
        inbox = layout.agent_inbox(&agent.name).display(),
    )
}

fn timer_unit(agent: &AgentConfig) -> String {
    format!(
        "[Unit]\n\
         Description=con timer: {name}\n\
         \n\
         [Timer]\n\
         OnCalendar={cron}\n\
         Persistent=true\n\
         \n\
         [Install]\n\
         WantedBy=timers.target\n",
        name = agent.name,
        cron = agent.cron,
    )
}

/// Synthesize the unit files for one agent: filename → content.
#[must_use]
pub fn generate_units(agent: &AgentConfig, layout: &Layout) -> BTreeMap<String, String> {
    let mut units = BTreeMap::new();
    let base = agent_unit(&agent.name);

    match agent.mode {
        Mode::OnDemand => {
            units.insert(format!("{base}.service"), service_unit(agent, layout, false));
            units.insert(format!("{base}.path"), path_unit(agent, layout));
        }
        Mode::Continuous => {
            units.insert(format!("{base}.service"), service_unit(agent, layout, true));
        }
        Mode::Cron => {
            units.insert(format!("{base}.service"), service_unit(agent, layout, false));
            units.insert(format!("{base}.timer"), timer_unit(agent));
            units.insert(format!("{base}.path"), path_unit(agent, layout));
        }
    }

    units
}

/// Synthesize the healthcheck service/timer pair.
#[must_use]
pub fn generate_healthcheck_units(interval: &str) -> BTreeMap<String, String> {
    let mut units = BTreeMap::new();

    units.insert(
        "con-healthcheck.service".to_string(),
        format!(
            "[Unit]\n\
             Description=con contract healthcheck\n\
             After=network.target\n\
             \n\
             [Service]\n\
             Type=oneshot\n\
             ExecStart={BINARY} healthcheck\n"
        ),
    );

    units.insert(
        "con-healthcheck.timer".to_string(),
        format!(
            "[Unit]\n\
             Description=con healthcheck timer\n\
             \n\
             [Timer]\n\
             OnBootSec=30s\n\
             OnUnitActiveSec={interval}\n\
             AccuracySec=1s\n\
             \n\
             [Install]\n\
             WantedBy=timers.target\n"
        ),
    );

    units
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(name: &str, tier: Tier, mode: Mode) -> AgentConfig {
        AgentConfig {
            name: name.to_string(),
            tier,
            mode,
            ..Default::default()
        }
    }

    #[test]
    fn on_demand_agent_gets_service_and_path() {
        let layout = Layout::default();
        let units = generate_units(
            &agent("concierge", Tier::Operator, Mode::OnDemand),
            &layout,
        );

        let keys: Vec<&str> = units.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["con-concierge.path", "con-concierge.service"]);

        let service = &units["con-concierge.service"];
        assert!(service.contains("User=a-concierge"));
        assert!(service.contains("ExecStart=/usr/local/bin/con run concierge"));
        assert!(service.contains("WorkingDirectory=/srv/con/agents/concierge/workspace"));
        assert!(service.contains("EnvironmentFile=-/etc/con/env"));

        let path = &units["con-concierge.path"];
        assert!(path.contains("PathChanged=/srv/con/agents/concierge/inbox"));
    }

    #[test]
    fn cron_agent_gets_service_timer_and_path() {
        let layout = Layout::default();
        let mut reporter = agent("reporter", Tier::Worker, Mode::Cron);
        reporter.cron = "*-*-* 09:00:00".to_string();
        let units = generate_units(&reporter, &layout);

        assert!(units.contains_key("con-reporter.service"));
        assert!(units.contains_key("con-reporter.path"));
        let timer = &units["con-reporter.timer"];
        assert!(timer.contains("OnCalendar=*-*-* 09:00:00"));
    }

    #[test]
    fn continuous_agent_gets_a_long_running_service() {
        let layout = Layout::default();
        let units = generate_units(&agent("watcher", Tier::Worker, Mode::Continuous), &layout);

        let keys: Vec<&str> = units.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["con-watcher.service"]);

        let service = &units["con-watcher.service"];
        assert!(service.contains("Type=simple"));
        assert!(service.contains("Restart=on-failure"));
        assert!(service.contains("ExecStart=/usr/local/bin/con run watcher --continuous"));
    }

    #[test]
    fn every_mode_yields_a_service() {
        let layout = Layout::default();
        for mode in [Mode::OnDemand, Mode::Continuous, Mode::Cron] {
            let mut a = agent("x", Tier::Worker, mode);
            a.cron = "daily".to_string();
            let units = generate_units(&a, &layout);
            assert!(units.contains_key("con-x.service"), "mode {mode}");
            let expect_path = matches!(mode, Mode::OnDemand | Mode::Cron);
            assert_eq!(units.contains_key("con-x.path"), expect_path, "mode {mode}");
            assert_eq!(
                units.contains_key("con-x.timer"),
                mode == Mode::Cron,
                "mode {mode}"
            );
        }
    }

    #[test]
    fn worker_hardening_is_strict() {
        let layout = Layout::default();
        let units = generate_units(&agent("drone", Tier::Worker, Mode::OnDemand), &layout);
        let service = &units["con-drone.service"];
        assert!(service.contains("NoNewPrivileges=yes"));
        assert!(service.contains("ProtectSystem=strict"));
        assert!(service.contains("ProtectHome=tmpfs"));
        assert!(service.contains("PrivateTmp=yes"));
        assert!(service.contains("PrivateDevices=yes"));
        assert!(!service.contains("ReadWritePaths=/srv/con/policy"));
    }

    #[test]
    fn operator_hardening_grants_shared_writes() {
        let layout = Layout::default();
        let units = generate_units(&agent("desk", Tier::Operator, Mode::OnDemand), &layout);
        let service = &units["con-desk.service"];
        assert!(service.contains("NoNewPrivileges=yes"));
        assert!(service.contains("ProtectSystem=strict"));
        assert!(service.contains("ReadWritePaths=/srv/con/agents"));
        assert!(service.contains("ReadWritePaths=/srv/con/artifacts"));
        assert!(service.contains("ReadWritePaths=/srv/con/logs/audit"));
        assert!(service.contains("ReadWritePaths=/srv/con/policy"));
        assert!(service.contains("ReadWritePaths=/srv/con/ledger"));
    }

    #[test]
    fn sysadmin_role_drops_lockdown_for_commissioning() {
        let layout = Layout::default();
        let mut admin = agent("fixer", Tier::Operator, Mode::OnDemand);
        admin.roles = vec!["sysadmin".to_string()];
        let units = generate_units(&admin, &layout);
        let service = &units["con-fixer.service"];
        assert!(!service.contains("NoNewPrivileges"));
        assert!(!service.contains("ProtectSystem=strict"));
        assert!(service.contains("ReadWritePaths=/etc/con"));
        assert!(service.contains("ReadWritePaths=/etc/sudoers.d"));
        assert!(service.contains("ReadWritePaths=/etc/systemd/system"));
        assert!(service.contains("ReadWritePaths=/srv/con/contracts"));
    }

    #[test]
    fn healthcheck_pair() {
        let units = generate_healthcheck_units("60s");
        let service = &units["con-healthcheck.service"];
        assert!(service.contains("Type=oneshot"));
        assert!(service.contains("ExecStart=/usr/local/bin/con healthcheck"));

        let timer = &units["con-healthcheck.timer"];
        assert!(timer.contains("OnBootSec=30s"));
        assert!(timer.contains("OnUnitActiveSec=60s"));
    }
}
