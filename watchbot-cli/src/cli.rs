//! Command-line and environment options.
//!
//! All options are env-sourced with documented defaults; the parsed
//! arguments are assembled once into the observer and sink configuration
//! structs and passed into the constructors.

use chat_sink::slack::SlackConfig;
use clap::{Parser, ValueEnum};
use cluster_watch::{WatchConfig, WatchMode};

#[derive(Parser, Debug)]
#[command(name = "watchbot", version, about = "Relays cluster changes to a chat channel")]
pub struct Args {
    /// Kubernetes API server URL; kubeconfig/in-cluster discovery when
    /// unset.
    #[arg(long, env = "K8S_HOST")]
    pub host: Option<String>,

    /// Skip TLS certificate verification for the cluster connection.
    #[arg(long, env = "K8S_INSECURE", default_value_t = false)]
    pub insecure: bool,

    /// Namespace to watch; all namespaces when unset.
    #[arg(long, env = "K8S_NAMESPACE")]
    pub namespace: Option<String>,

    /// Watch request timeout in seconds.
    #[arg(long, env = "K8S_INTERVAL", default_value_t = 290)]
    pub interval: u32,

    /// Which feed to observe.
    #[arg(long, env = "WATCH_MODE", value_enum, default_value = "typed")]
    pub mode: Mode,

    /// Extra source components to mute in events mode, comma separated.
    #[arg(long, env = "WATCH_MUTE_SOURCES", value_delimiter = ',')]
    pub mute_sources: Vec<String>,

    /// Chat bot token.
    #[arg(long, env = "BOT_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Channel that receives the notifications.
    #[arg(long, env = "BOT_CHANNEL")]
    pub channel: String,

    /// Chat platform API host.
    #[arg(long, env = "BOT_HOST", default_value = "https://slack.com")]
    pub bot_host: String,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Per-object pod/node watches; every change is emitted.
    Typed,
    /// The cluster-level event feed with suppression rules.
    Events,
}

impl Args {
    pub fn watch_config(&self) -> WatchConfig {
        let mut config = WatchConfig {
            namespace: self.namespace.clone(),
            watch_timeout_secs: self.interval,
            ..WatchConfig::default()
        };
        if self.mode == Mode::Events {
            config.mode = WatchMode::ClusterEvents;
        }
        for source in &self.mute_sources {
            config.noisy_sources.insert(source.clone());
        }
        config
    }

    pub fn slack_config(&self) -> SlackConfig {
        SlackConfig::new(self.token.as_str()).with_api_host(self.bot_host.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["watchbot", "--token", "xoxb-test", "--channel", "#ops"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_mode_selects_watch_variant() {
        let config = args(&[]).watch_config();
        assert!(matches!(config.mode, WatchMode::Typed { .. }));

        let config = args(&["--mode", "events"]).watch_config();
        assert_eq!(config.mode, WatchMode::ClusterEvents);
    }

    #[test]
    fn test_extra_mute_sources_extend_the_default_set() {
        let config = args(&["--mute-sources", "horizontal-pod-autoscaler,cron-controller"])
            .watch_config();
        assert!(config.noisy_sources.contains("kubelet"));
        assert!(config.noisy_sources.contains("horizontal-pod-autoscaler"));
        assert!(config.noisy_sources.contains("cron-controller"));
    }
}
