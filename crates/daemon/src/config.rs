//! Configuration management for the Tessera daemon.
//!
//! Configuration is loaded from TOML files in the following locations (in order):
//! 1. `<config dir>/tessera/config.toml` (XDG standard)
//! 2. `~/.config/tessera/config.toml`
//! 3. `./config.toml` (current directory, for development)

use anyhow::{Context, Result};
use directories::ProjectDirs;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tessera_core_layout::{clamp_master_factor, WindowInfo, DEFAULT_MASTER_FACTOR};
use tessera_ipc::IpcCommand;
use tessera_platform::{EaseSpec, Easing};
use tessera_wm::{AnimationParams, ManagerSettings};

/// Main configuration structure for Tessera.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Layout configuration.
    pub layout: LayoutConfig,
    /// Effect timings.
    pub animation: AnimationConfig,
    /// Behavior configuration.
    pub behavior: BehaviorConfig,
    /// Hotkey bindings.
    pub hotkeys: HotkeyConfig,
    /// Window rules for per-window behavior.
    #[serde(default)]
    pub window_rules: Vec<WindowRule>,
}

/// Layout-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Fraction of the work area width given to the master column.
    #[serde(default = "default_master_factor")]
    pub master_factor: f64,

    /// Increment applied by the master factor keybindings.
    #[serde(default = "default_master_factor_step")]
    pub master_factor_step: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            master_factor: default_master_factor(),
            master_factor_step: default_master_factor_step(),
        }
    }
}

/// Effect durations, scales and easing curves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    pub map_duration_ms: u32,
    /// Scale a window grows from when it maps.
    pub map_scale: f64,
    pub map_easing: Easing,
    /// Fade-in duration of menus and notifications.
    pub fade_duration_ms: u32,
    pub destroy_duration_ms: u32,
    /// Scale a window shrinks to when it is destroyed.
    pub destroy_scale: f64,
    pub destroy_easing: Easing,
    pub switch_duration_ms: u32,
    pub switch_easing: Easing,
    /// Fade-in of the windows adopted when the daemon takes over a session.
    pub startup_fade_duration_ms: u32,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            map_duration_ms: 150,
            map_scale: 0.8,
            map_easing: Easing::EaseIn,
            fade_duration_ms: 115,
            destroy_duration_ms: 130,
            destroy_scale: 0.6,
            destroy_easing: Easing::EaseOutQuad,
            switch_duration_ms: 250,
            switch_easing: Easing::EaseOutQuad,
            startup_fade_duration_ms: 1000,
        }
    }
}

/// Behavior-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Tile the windows that already exist when the host connects.
    #[serde(default = "default_true")]
    pub manage_existing: bool,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            manage_existing: true,
        }
    }
}

// Default value functions for serde
fn default_master_factor() -> f64 {
    DEFAULT_MASTER_FACTOR
}

fn default_master_factor_step() -> f64 {
    0.05
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

// ============================================================================
// Window Rules
// ============================================================================

/// A rule for per-window behavior.
///
/// Window rules are evaluated in order; the first matching rule wins.
///
/// # Example Config
///
/// ```toml
/// [[window_rules]]
/// match_class = "^gimp"
/// action = "float"
///
/// [[window_rules]]
/// match_class = "firefox"
/// match_title = ".*Picture-in-Picture.*"
/// action = "float"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowRule {
    /// Regex pattern to match window class name.
    #[serde(default)]
    pub match_class: Option<String>,

    /// Regex pattern to match window title.
    #[serde(default)]
    pub match_title: Option<String>,

    /// Action to take when the rule matches.
    #[serde(default)]
    pub action: WindowAction,
}

/// Action to take for a matching window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowAction {
    /// Tile the window even if the host asks for floating.
    #[default]
    Tile,
    /// Float the window outside the tiling layout.
    Float,
}

impl WindowRule {
    /// Check if this rule matches a window with the given properties.
    ///
    /// All specified match criteria must match for the rule to apply.
    /// If no match criteria are specified, the rule matches nothing.
    pub fn matches(&self, class_name: &str, title: &str) -> bool {
        if self.match_class.is_none() && self.match_title.is_none() {
            return false;
        }

        let criteria = [
            (self.match_class.as_deref(), class_name),
            (self.match_title.as_deref(), title),
        ];
        criteria.iter().all(|(pattern, value)| match pattern {
            None => true,
            Some(pattern) => match Regex::new(pattern) {
                Ok(re) => re.is_match(value),
                Err(_) => {
                    tracing::warn!("Invalid regex in window rule: {}", pattern);
                    false
                }
            },
        })
    }
}

/// Hotkey bindings configuration.
///
/// Each key is an accelerator in the host's syntax (e.g., "<Super>j") and
/// each value is a command (e.g., "focus_next"). Supported commands:
/// - focus_next, focus_prev
/// - swap_next, swap_prev, promote
/// - increase_master_factor, decrease_master_factor
/// - retile, reload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HotkeyConfig {
    /// Map of accelerator to command name.
    #[serde(flatten)]
    pub bindings: HashMap<String, String>,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        let mut bindings = HashMap::new();

        bindings.insert("<Super>j".to_string(), "focus_next".to_string());
        bindings.insert("<Super>k".to_string(), "focus_prev".to_string());

        bindings.insert("<Super><Shift>j".to_string(), "swap_next".to_string());
        bindings.insert("<Super><Shift>k".to_string(), "swap_prev".to_string());
        bindings.insert("<Super>Return".to_string(), "promote".to_string());

        bindings.insert("<Super>l".to_string(), "increase_master_factor".to_string());
        bindings.insert("<Super>h".to_string(), "decrease_master_factor".to_string());

        bindings.insert("<Super><Shift>r".to_string(), "retile".to_string());

        Self { bindings }
    }
}

/// Parse a command string into an IpcCommand.
///
/// Returns None if the command is not recognized.
pub fn parse_command(cmd: &str) -> Option<IpcCommand> {
    match cmd.to_lowercase().as_str() {
        "focus_next" => Some(IpcCommand::FocusNext),
        "focus_prev" => Some(IpcCommand::FocusPrev),
        "swap_next" => Some(IpcCommand::SwapNext),
        "swap_prev" => Some(IpcCommand::SwapPrev),
        "promote" => Some(IpcCommand::Promote),
        "increase_master_factor" => Some(IpcCommand::IncreaseMasterFactor),
        "decrease_master_factor" => Some(IpcCommand::DecreaseMasterFactor),
        "retile" => Some(IpcCommand::Retile),
        "reload" => Some(IpcCommand::Reload),
        _ => None,
    }
}

/// A value that was out of range and has been replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
}

impl ConfigWarning {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl Config {
    /// Load configuration from standard locations.
    ///
    /// Tries the following locations in order:
    /// 1. `<config dir>/tessera/config.toml`
    /// 2. `~/.config/tessera/config.toml`
    /// 3. `./config.toml`
    ///
    /// Returns default config if no file is found.
    pub fn load() -> Result<Self> {
        let paths = config_paths();

        for path in &paths {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific path.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Replace out-of-range values with usable ones.
    ///
    /// Returns one warning per replaced or unusable value.
    pub fn validate(&mut self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        let layout = &mut self.layout;
        if !layout.master_factor.is_finite() {
            warnings.push(ConfigWarning::new(
                "layout.master_factor",
                format!("not a number, using {}", DEFAULT_MASTER_FACTOR),
            ));
            layout.master_factor = DEFAULT_MASTER_FACTOR;
        } else {
            let clamped = clamp_master_factor(layout.master_factor);
            if clamped != layout.master_factor {
                warnings.push(ConfigWarning::new(
                    "layout.master_factor",
                    format!("{} is out of range, using {}", layout.master_factor, clamped),
                ));
                layout.master_factor = clamped;
            }
        }

        if !(layout.master_factor_step > 0.0 && layout.master_factor_step <= 0.5) {
            warnings.push(ConfigWarning::new(
                "layout.master_factor_step",
                format!(
                    "{} must be in (0, 0.5], using {}",
                    layout.master_factor_step,
                    default_master_factor_step()
                ),
            ));
            layout.master_factor_step = default_master_factor_step();
        }

        let defaults = AnimationConfig::default();
        let animation = &mut self.animation;
        for (field, value, default) in [
            ("animation.map_duration_ms", &mut animation.map_duration_ms, defaults.map_duration_ms),
            ("animation.fade_duration_ms", &mut animation.fade_duration_ms, defaults.fade_duration_ms),
            (
                "animation.destroy_duration_ms",
                &mut animation.destroy_duration_ms,
                defaults.destroy_duration_ms,
            ),
            (
                "animation.switch_duration_ms",
                &mut animation.switch_duration_ms,
                defaults.switch_duration_ms,
            ),
            (
                "animation.startup_fade_duration_ms",
                &mut animation.startup_fade_duration_ms,
                defaults.startup_fade_duration_ms,
            ),
        ] {
            // Zero-length transitions never report completion on some hosts.
            if *value == 0 {
                warnings.push(ConfigWarning::new(field, format!("must be positive, using {}", default)));
                *value = default;
            }
        }

        for (field, value, default) in [
            ("animation.map_scale", &mut animation.map_scale, defaults.map_scale),
            ("animation.destroy_scale", &mut animation.destroy_scale, defaults.destroy_scale),
        ] {
            if !(*value > 0.0 && *value <= 1.0) {
                warnings.push(ConfigWarning::new(
                    field,
                    format!("{} must be in (0, 1], using {}", value, default),
                ));
                *value = default;
            }
        }

        let level = self.behavior.log_level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            warnings.push(ConfigWarning::new(
                "behavior.log_level",
                format!("unknown level '{}', using info", self.behavior.log_level),
            ));
            self.behavior.log_level = default_log_level();
        }

        for (accelerator, command) in &self.hotkeys.bindings {
            if parse_command(command).is_none() {
                warnings.push(ConfigWarning::new(
                    format!("hotkeys.{}", accelerator),
                    format!("unknown command '{}'", command),
                ));
            }
        }

        for (i, rule) in self.window_rules.iter().enumerate() {
            for pattern in [&rule.match_class, &rule.match_title].into_iter().flatten() {
                if let Err(e) = Regex::new(pattern) {
                    warnings.push(ConfigWarning::new(
                        format!("window_rules[{}]", i),
                        format!("invalid regex '{}': {}", pattern, e),
                    ));
                }
            }
        }

        warnings
    }

    /// Apply the first matching window rule to a window description.
    pub fn apply_window_rules(&self, window: &mut WindowInfo) {
        let rule = self
            .window_rules
            .iter()
            .find(|rule| rule.matches(&window.class_name, &window.title));

        if let Some(rule) = rule {
            tracing::debug!("Window {} matched rule: {:?}", window.id, rule.action);
            window.floating = rule.action == WindowAction::Float;
        }
    }

    /// Manager tunables derived from this configuration.
    pub fn manager_settings(&self) -> ManagerSettings {
        let animation = &self.animation;
        ManagerSettings {
            master_factor: self.layout.master_factor,
            master_factor_step: self.layout.master_factor_step,
            animation: AnimationParams {
                map: EaseSpec::new(animation.map_easing, animation.map_duration_ms),
                map_scale: animation.map_scale,
                fade: EaseSpec::new(animation.map_easing, animation.fade_duration_ms),
                destroy: EaseSpec::new(animation.destroy_easing, animation.destroy_duration_ms),
                destroy_scale: animation.destroy_scale,
                switch: EaseSpec::new(animation.switch_easing, animation.switch_duration_ms),
                startup: EaseSpec::new(Easing::EaseOutQuad, animation.startup_fade_duration_ms),
            },
        }
    }

    /// Accelerators to grab, with the command each one runs.
    pub fn key_bindings(&self) -> HashMap<String, IpcCommand> {
        self.hotkeys
            .bindings
            .iter()
            .filter_map(|(accelerator, command)| {
                parse_command(command).map(|cmd| (accelerator.clone(), cmd))
            })
            .collect()
    }
}

/// Get all possible config file paths in priority order.
pub fn config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // 1. XDG standard: $XDG_CONFIG_HOME/tessera/config.toml
    if let Some(proj_dirs) = ProjectDirs::from("com", "tessera", "tessera") {
        paths.push(proj_dirs.config_dir().join("config.toml"));
    }

    // 2. ~/.config/tessera/config.toml
    if let Some(home) = dirs_home() {
        let path = home.join(".config").join("tessera").join("config.toml");
        if !paths.contains(&path) {
            paths.push(path);
        }
    }

    // 3. Current directory: ./config.toml
    paths.push(PathBuf::from("config.toml"));

    paths
}

/// Get the user's home directory.
fn dirs_home() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core_layout::WindowKind;

    fn rule(class: Option<&str>, title: Option<&str>, action: WindowAction) -> WindowRule {
        WindowRule {
            match_class: class.map(str::to_string),
            match_title: title.map(str::to_string),
            action,
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.layout.master_factor, 0.55);
        assert_eq!(config.layout.master_factor_step, 0.05);
        assert_eq!(config.animation.map_duration_ms, 150);
        assert_eq!(config.animation.fade_duration_ms, 115);
        assert_eq!(config.animation.destroy_duration_ms, 130);
        assert_eq!(config.animation.switch_duration_ms, 250);
        assert_eq!(config.animation.startup_fade_duration_ms, 1000);
        assert_eq!(config.behavior.log_level, "info");
        assert!(config.behavior.manage_existing);
        assert!(config.window_rules.is_empty());
    }

    #[test]
    fn test_default_settings_match_manager_defaults() {
        assert_eq!(Config::default().manager_settings(), ManagerSettings::default());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.layout.master_factor, config.layout.master_factor);
        assert_eq!(parsed.animation.switch_easing, config.animation.switch_easing);
    }

    #[test]
    fn test_config_partial_parse() {
        // Config with only some fields should use defaults for the rest
        let toml_str = r#"
            [layout]
            master_factor = 0.6

            [animation]
            switch_easing = "linear"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.layout.master_factor, 0.6);
        assert_eq!(config.layout.master_factor_step, 0.05); // default
        assert_eq!(config.animation.switch_easing, Easing::Linear);
        assert_eq!(config.animation.map_easing, Easing::EaseIn); // default
    }

    #[test]
    fn test_startup_fade_duration() {
        let toml_str = r#"
            [animation]
            startup_fade_duration_ms = 400
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        let startup = config.manager_settings().animation.startup;
        assert_eq!(startup, EaseSpec::new(Easing::EaseOutQuad, 400));

        let mut config: Config =
            toml::from_str("[animation]\nstartup_fade_duration_ms = 0\n").unwrap();
        let warnings = config.validate();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "animation.startup_fade_duration_ms");
        assert_eq!(config.animation.startup_fade_duration_ms, 1000);
    }

    #[test]
    fn test_validate_clean_config() {
        let mut config = Config::default();
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_validate_clamps_values() {
        let toml_str = r#"
            [layout]
            master_factor = 1.5
            master_factor_step = 0.0

            [animation]
            map_duration_ms = 0
            destroy_scale = 3.0

            [behavior]
            log_level = "loud"
        "#;
        let mut config: Config = toml::from_str(toml_str).unwrap();
        let warnings = config.validate();

        let fields: Vec<&str> = warnings.iter().map(|w| w.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "layout.master_factor",
                "layout.master_factor_step",
                "animation.map_duration_ms",
                "animation.destroy_scale",
                "behavior.log_level",
            ]
        );
        assert_eq!(config.layout.master_factor, 0.9);
        assert_eq!(config.layout.master_factor_step, 0.05);
        assert_eq!(config.animation.map_duration_ms, 150);
        assert_eq!(config.animation.destroy_scale, 0.6);
        assert_eq!(config.behavior.log_level, "info");
    }

    #[test]
    fn test_validate_reports_bad_hotkeys_and_rules() {
        let toml_str = r#"
            [hotkeys]
            "<Super>x" = "explode"

            [[window_rules]]
            match_class = "("
            action = "float"
        "#;
        let mut config: Config = toml::from_str(toml_str).unwrap();
        let warnings = config.validate();

        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().any(|w| w.field == "hotkeys.<Super>x"));
        assert!(warnings.iter().any(|w| w.field == "window_rules[0]"));
        assert!(warnings[0].to_string().contains(": "));
    }

    #[test]
    fn test_config_paths_not_empty() {
        let paths = config_paths();
        assert!(!paths.is_empty());
        assert_eq!(paths.last(), Some(&PathBuf::from("config.toml")));
    }

    #[test]
    fn test_hotkey_config_default() {
        let config = HotkeyConfig::default();
        assert!(!config.bindings.is_empty());
        assert_eq!(config.bindings.get("<Super>j"), Some(&"focus_next".to_string()));
        assert_eq!(config.bindings.get("<Super>Return"), Some(&"promote".to_string()));
        for command in config.bindings.values() {
            assert!(parse_command(command).is_some(), "{}", command);
        }
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("focus_next"), Some(IpcCommand::FocusNext));
        assert_eq!(parse_command("FOCUS_PREV"), Some(IpcCommand::FocusPrev));
        assert_eq!(parse_command("swap_next"), Some(IpcCommand::SwapNext));
        assert_eq!(parse_command("promote"), Some(IpcCommand::Promote));
        assert_eq!(
            parse_command("increase_master_factor"),
            Some(IpcCommand::IncreaseMasterFactor)
        );
        assert_eq!(parse_command("retile"), Some(IpcCommand::Retile));
        assert_eq!(parse_command("unknown_command"), None);
    }

    #[test]
    fn test_key_bindings_skip_unknown_commands() {
        let toml_str = r#"
            [hotkeys]
            "<Super>a" = "focus_next"
            "<Super>b" = "nonsense"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        let bindings = config.key_bindings();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings.get("<Super>a"), Some(&IpcCommand::FocusNext));
    }

    #[test]
    fn test_window_rule_matches_class() {
        let rule = rule(Some("^gimp"), None, WindowAction::Float);

        assert!(rule.matches("gimp-2.10", "GNU Image Manipulation Program"));
        assert!(!rule.matches("inkscape", "gimp tutorial.svg"));
    }

    #[test]
    fn test_window_rule_matches_combined() {
        let rule = rule(Some("firefox"), Some(".*Picture-in-Picture.*"), WindowAction::Float);

        // Both patterns must match
        assert!(rule.matches("firefox", "Picture-in-Picture"));
        assert!(!rule.matches("chromium", "Picture-in-Picture"));
        assert!(!rule.matches("firefox", "Mozilla Firefox"));
    }

    #[test]
    fn test_window_rule_no_criteria_matches_nothing() {
        let rule = rule(None, None, WindowAction::Float);
        assert!(!rule.matches("AnyClass", "Any Title"));
    }

    #[test]
    fn test_window_rule_invalid_regex_matches_nothing() {
        let rule = rule(Some("("), None, WindowAction::Float);
        assert!(!rule.matches("(", ""));
    }

    #[test]
    fn test_apply_window_rules_first_match_wins() {
        let config = Config {
            window_rules: vec![
                rule(Some("term"), Some("scratch"), WindowAction::Float),
                rule(Some("term"), None, WindowAction::Tile),
            ],
            ..Config::default()
        };

        let mut scratch = WindowInfo::new(1, WindowKind::Normal, 0);
        scratch.class_name = "term".to_string();
        scratch.title = "scratch".to_string();
        config.apply_window_rules(&mut scratch);
        assert!(scratch.floating);

        let mut plain = WindowInfo::new(2, WindowKind::Normal, 0);
        plain.class_name = "term".to_string();
        plain.floating = true;
        config.apply_window_rules(&mut plain);
        assert!(!plain.floating);

        let mut other = WindowInfo::new(3, WindowKind::Normal, 0);
        other.floating = true;
        config.apply_window_rules(&mut other);
        assert!(other.floating);
    }

    #[test]
    fn test_window_rule_config_parse() {
        let toml_str = r#"
            [[window_rules]]
            match_class = "pavucontrol"
            action = "float"

            [[window_rules]]
            match_title = ".*Settings.*"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.window_rules.len(), 2);
        assert_eq!(config.window_rules[0].action, WindowAction::Float);
        assert_eq!(config.window_rules[1].action, WindowAction::Tile);
    }
}
