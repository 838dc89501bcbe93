use std::path::PathBuf;

use clap::{Parser, Subcommand};
use policy_core::{EnforcerConfig, PolicyManager, Rule, DEFAULT_GROUPING_TYPE, DEFAULT_POLICY_TYPE};
use serde_json::{json, Value};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "policy-cli", version, about = "Inspect a policy model loaded from TOML")]
struct Cli {
    /// Path to the enforcer configuration
    #[arg(long, default_value = "policy.toml")]
    config: PathBuf,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List authorization rules of a section
    Policies {
        #[arg(long, default_value = DEFAULT_POLICY_TYPE)]
        ptype: String,
    },
    /// List grouping rules of a section
    Grouping {
        #[arg(long, default_value = DEFAULT_GROUPING_TYPE)]
        ptype: String,
    },
    /// List rules whose fields match, starting at --index; "" matches anything
    Filter {
        #[arg(long)]
        ptype: String,
        #[arg(long, default_value_t = 0)]
        index: usize,
        #[arg(long, num_args = 1.., required = true)]
        values: Vec<String>,
    },
    /// Check whether a rule exists
    Has {
        #[arg(long, default_value = DEFAULT_POLICY_TYPE)]
        ptype: String,
        #[arg(required = true)]
        fields: Vec<String>,
    },
    /// Roles directly assigned to a user
    Roles { user: String },
    /// Distinct subjects of the default authorization section
    Subjects,
}

fn execute(manager: &PolicyManager, command: &Commands) -> policy_core::Result<Value> {
    let value = match command {
        Commands::Policies { ptype } => rules_json(manager.get_named_policy(ptype)),
        Commands::Grouping { ptype } => rules_json(manager.get_named_grouping_policy(ptype)),
        Commands::Filter {
            ptype,
            index,
            values,
        } => {
            let values: Vec<&str> = values.iter().map(String::as_str).collect();
            rules_json(manager.get_filtered_named_policy(ptype, *index, &values)?)
        }
        Commands::Has { ptype, fields } => json!(manager.has_named_policy(ptype, fields.clone())),
        Commands::Roles { user } => json!(manager.get_roles_for_user(user)),
        Commands::Subjects => json!(manager.get_all_subjects()?),
    };
    Ok(value)
}

fn rules_json(rules: Vec<Rule>) -> Value {
    json!(rules)
}

fn render(value: &Value) -> String {
    match value {
        Value::Array(items) if items.is_empty() => "(none)".to_string(),
        Value::Array(items) => items
            .iter()
            .map(render_row)
            .collect::<Vec<_>>()
            .join("\n"),
        other => render_row(other),
    }
}

fn render_row(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(fields) => fields
            .iter()
            .map(render_row)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

fn run(cli: &Cli) -> policy_core::Result<String> {
    let config = EnforcerConfig::from_file(&cli.config)?;
    let manager = PolicyManager::from_config(&config)?;
    info!("Loaded policy model from {:?}", cli.config);

    let value = execute(&manager, &cli.command)?;
    Ok(format_output(&value, cli.json))
}

fn format_output(value: &Value, json: bool) -> String {
    if !json {
        return render(value);
    }
    match serde_json::to_string_pretty(value) {
        Ok(out) => out,
        Err(e) => {
            warn!("JSON output failed, printing plain text: {}", e);
            render(value)
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            error!("Command failed: {}", e);
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_manager() -> PolicyManager {
        let manager = PolicyManager::new();
        manager
            .add_policies([["alice", "data1", "read"], ["bob", "data2", "write"]])
            .unwrap();
        manager.add_grouping_policy(["alice", "admin"]).unwrap();
        manager
    }

    #[test]
    fn test_parse_filter() {
        let cli = Cli::try_parse_from([
            "policy-cli", "--config", "x.toml", "filter", "--ptype", "p", "--index", "1",
            "--values", "data1", "read",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("x.toml"));
        match cli.command {
            Commands::Filter {
                ptype,
                index,
                values,
            } => {
                assert_eq!(ptype, "p");
                assert_eq!(index, 1);
                assert_eq!(values, vec!["data1", "read"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_defaults() {
        let cli = Cli::try_parse_from(["policy-cli", "policies", "--json"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.config, PathBuf::from("policy.toml"));
        assert!(matches!(cli.command, Commands::Policies { ref ptype } if ptype == "p"));

        assert!(Cli::try_parse_from(["policy-cli", "has"]).is_err());
        assert!(Cli::try_parse_from(["policy-cli", "roles"]).is_err());
    }

    #[test]
    fn test_execute_commands() {
        let manager = sample_manager();

        let policies = execute(&manager, &Commands::Policies { ptype: "p".into() }).unwrap();
        assert_eq!(render(&policies), "alice, data1, read\nbob, data2, write");

        let has = Commands::Has {
            ptype: "g".into(),
            fields: vec!["alice".into(), "admin".into()],
        };
        assert_eq!(execute(&manager, &has).unwrap(), json!(true));

        let roles = execute(&manager, &Commands::Roles { user: "alice".into() }).unwrap();
        assert_eq!(roles, json!(["admin"]));

        let subjects = execute(&manager, &Commands::Subjects).unwrap();
        assert_eq!(render(&subjects), "alice\nbob");
    }

    #[test]
    fn test_format_output_modes() {
        let manager = sample_manager();
        let roles = execute(&manager, &Commands::Roles { user: "alice".into() }).unwrap();

        assert_eq!(format_output(&roles, false), "admin");
        let json_out = format_output(&roles, true);
        assert_eq!(serde_json::from_str::<Value>(&json_out).unwrap(), json!(["admin"]));
    }

    #[test]
    fn test_execute_filter_errors_propagate() {
        let manager = sample_manager();
        let filter = Commands::Filter {
            ptype: "p".into(),
            index: 2,
            values: vec!["read".into(), "extra".into()],
        };
        assert!(execute(&manager, &filter).is_err());

        let empty = execute(&manager, &Commands::Roles { user: "nobody".into() }).unwrap();
        assert_eq!(render(&empty), "(none)");
    }
}
