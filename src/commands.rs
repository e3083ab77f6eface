//! Command line subcommands and their dispatch onto the bridge.

use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;

use jira_soap::bridge::DEFAULT_SEARCH_LIMIT;
use jira_soap::{Config, JiraSoapBridge, NewIssue};

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Log in and store the session token
  Login {
    #[arg(short, long)]
    username: Option<String>,
    /// Password (default: $JIRA_SOAP_PASSWORD)
    #[arg(long, env = "JIRA_SOAP_PASSWORD", hide_env_values = true)]
    password: Option<String>,
  },
  /// Show an issue
  View { key: String },
  /// List sub-tasks of an issue
  Subtasks { key: String },
  /// Free text search
  Search {
    text: String,
    #[arg(short, long)]
    project: Option<String>,
    #[arg(short, long, default_value_t = DEFAULT_SEARCH_LIMIT)]
    limit: i64,
  },
  /// Search with a JQL query
  Jql {
    query: String,
    #[arg(short, long, default_value_t = DEFAULT_SEARCH_LIMIT)]
    limit: i64,
  },
  /// Issues matched by saved or favourite filters
  Filter {
    #[arg(required = true)]
    names: Vec<String>,
  },
  /// Create an issue
  Create {
    #[arg(short, long)]
    project: String,
    #[arg(short, long)]
    summary: String,
    #[arg(short, long, default_value = "")]
    description: String,
    #[arg(short = 't', long = "type", default_value = "bug")]
    issue_type: String,
    #[arg(long, default_value = "minor")]
    priority: String,
    /// Create a sub-task of this issue
    #[arg(long)]
    parent: Option<String>,
    #[arg(long)]
    assignee: Option<String>,
    #[arg(long)]
    reporter: Option<String>,
  },
  /// Set issue fields (field=value)
  Update {
    key: String,
    #[arg(required = true, value_parser = parse_field)]
    fields: Vec<(String, String)>,
  },
  /// Assign an issue
  Assign { key: String, assignee: String },
  /// Add a comment
  Comment { key: String, body: String },
  /// List comments on an issue
  Comments { key: String },
  /// List workflow transitions available on an issue
  Transitions { key: String },
  /// Move an issue through a workflow transition
  Transition {
    key: String,
    name: String,
    #[arg(short, long, default_value = "")]
    comment: String,
  },
  /// List issue types
  Types,
  /// List sub-task issue types
  SubtaskTypes,
  /// List priorities
  Priorities,
  /// List statuses
  Statuses,
  /// List resolutions
  Resolutions,
  /// List saved and favourite filters
  Filters,
  /// List projects
  Projects,
  /// List components of a project
  Components { project: String },
  /// Drop cached reference data
  ClearCache,
}

fn parse_field(s: &str) -> std::result::Result<(String, String), String> {
  s.split_once('=')
    .map(|(k, v)| (k.trim().to_string(), v.to_string()))
    .filter(|(k, _)| !k.is_empty())
    .ok_or_else(|| format!("expected field=value, got '{}'", s))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  let out =
    serde_json::to_string_pretty(value).map_err(|e| eyre!("Failed to format output: {}", e))?;
  println!("{}", out);
  Ok(())
}

pub async fn run(command: Command, bridge: &mut JiraSoapBridge) -> Result<()> {
  match command {
    Command::Login { username, password } => {
      let username = username
        .or_else(|| bridge.config().jira.username.clone())
        .ok_or_else(|| eyre!("No username given. Pass --username or set jira.username."))?;
      let password = match password {
        Some(p) => p,
        None => Config::get_password()?,
      };
      bridge.login(&username, &password).await?;
      println!("Logged in as {}", username);
    }
    Command::View { key } => match bridge.get_issue(&key).await? {
      Some(issue) => print_json(&issue)?,
      None => return Err(eyre!("Issue {} not found", key)),
    },
    Command::Subtasks { key } => print_json(&bridge.get_children(&key).await?)?,
    Command::Search {
      text,
      project,
      limit,
    } => print_json(
      &bridge
        .search_issues(&text, project.as_deref(), limit)
        .await?,
    )?,
    Command::Jql { query, limit } => print_json(&bridge.search_issues_jql(&query, limit).await?)?,
    Command::Filter { names } => {
      let names: Vec<&str> = names.iter().map(String::as_str).collect();
      print_json(&bridge.get_issues_by_filter(&names).await?)?
    }
    Command::Create {
      project,
      summary,
      description,
      issue_type,
      priority,
      parent,
      assignee,
      reporter,
    } => {
      let issue = NewIssue {
        project,
        issue_type,
        summary,
        description,
        priority,
        parent,
        assignee,
        reporter,
      };
      print_json(&bridge.create_issue(&issue).await?)?
    }
    Command::Update { key, fields } => {
      let fields: Vec<(&str, &str)> = fields
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
      print_json(&bridge.update_issue(&key, &fields).await?)?
    }
    Command::Assign { key, assignee } => print_json(&bridge.assign_issue(&key, &assignee).await?)?,
    Command::Comment { key, body } => {
      bridge.add_comment(&key, &body).await?;
      println!("Comment added to {}", key);
    }
    Command::Comments { key } => print_json(&bridge.get_issue_comments(&key).await?)?,
    Command::Transitions { key } => print_json(&bridge.get_available_transitions(&key).await?)?,
    Command::Transition { key, name, comment } => {
      print_json(&bridge.transition_issue(&key, &name, &comment).await?)?
    }
    Command::Types => print_json(&bridge.get_issue_types().await?)?,
    Command::SubtaskTypes => print_json(&bridge.get_subtask_issue_types().await?)?,
    Command::Priorities => print_json(&bridge.get_priorities().await?)?,
    Command::Statuses => print_json(&bridge.get_statuses().await?)?,
    Command::Resolutions => print_json(&bridge.get_resolutions().await?)?,
    Command::Filters => print_json(&bridge.get_filters().await?)?,
    Command::Projects => print_json(&bridge.get_projects().await?)?,
    Command::Components { project } => print_json(&bridge.get_components(&project).await?)?,
    Command::ClearCache => {
      bridge.clear_cache()?;
      println!("Cache cleared");
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::Parser;

  #[derive(Parser, Debug)]
  struct Cli {
    #[command(subcommand)]
    command: Command,
  }

  #[test]
  fn test_parse_field() {
    assert_eq!(
      parse_field("assignee=bob").unwrap(),
      ("assignee".to_string(), "bob".to_string())
    );
    assert_eq!(
      parse_field("summary=a=b").unwrap(),
      ("summary".to_string(), "a=b".to_string())
    );
    assert!(parse_field("assignee").is_err());
    assert!(parse_field("=bob").is_err());
  }

  #[test]
  fn test_search_defaults_limit() {
    let cli = Cli::try_parse_from(["jira-soap", "search", "crash"]).unwrap();
    match cli.command {
      Command::Search { limit, project, .. } => {
        assert_eq!(limit, DEFAULT_SEARCH_LIMIT);
        assert!(project.is_none());
      }
      other => panic!("unexpected command {:?}", other),
    }
  }

  #[test]
  fn test_create_defaults() {
    let cli =
      Cli::try_parse_from(["jira-soap", "create", "-p", "PROJ", "-s", "Broken"]).unwrap();
    match cli.command {
      Command::Create {
        issue_type,
        priority,
        parent,
        ..
      } => {
        assert_eq!(issue_type, "bug");
        assert_eq!(priority, "minor");
        assert!(parent.is_none());
      }
      other => panic!("unexpected command {:?}", other),
    }
  }

  #[test]
  fn test_subtask_types_kebab_case() {
    let cli = Cli::try_parse_from(["jira-soap", "subtask-types"]).unwrap();
    assert!(matches!(cli.command, Command::SubtaskTypes));
  }
}
