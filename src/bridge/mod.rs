//! Issue tracker operations on top of Jira's SOAP service.
//!
//! Every operation is one (occasionally two) remote calls. Results are
//! flattened into [`Record`]s; reference data that rarely changes is kept in
//! a [`CacheLayer`] keyed by method name and Jira instance.

mod cache_key;
mod records;

pub use cache_key::{CachedCall, ReferenceData};
pub use records::{field, index_by_name, into_record, into_records, Record, RecordIndex};

use chrono::Duration;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::{CacheLayer, MemoryStorage, NoopStorage, SqliteStorage};
use crate::config::Config;
use crate::error::{BridgeError, Result};
use crate::soap::{HttpTransport, SoapClient, SoapTransport, SoapValue};

/// Default result limit for searches.
pub const DEFAULT_SEARCH_LIMIT: i64 = 100;

/// Fields of an issue to create.
#[derive(Debug, Clone)]
pub struct NewIssue {
  pub project: String,
  pub issue_type: String,
  pub summary: String,
  pub description: String,
  pub priority: String,
  /// Creates a sub-task of this issue when set
  pub parent: Option<String>,
  pub assignee: Option<String>,
  pub reporter: Option<String>,
}

impl NewIssue {
  pub fn new(project: impl Into<String>, summary: impl Into<String>) -> Self {
    Self {
      project: project.into(),
      issue_type: "bug".to_string(),
      summary: summary.into(),
      description: String::new(),
      priority: "minor".to_string(),
      parent: None,
      assignee: None,
      reporter: None,
    }
  }
}

/// Jira SOAP bridge.
///
/// A bridge whose service could not be reached at construction time is still
/// usable as a value; every remote operation then fails with
/// [`BridgeError::Initialization`].
pub struct JiraSoapBridge<T: SoapTransport = HttpTransport> {
  base_url: String,
  service: Option<SoapClient<T>>,
  token: Option<String>,
  config: Config,
  persist: bool,
  cache: CacheLayer,
}

impl JiraSoapBridge<HttpTransport> {
  /// Probe the configured Jira instance and open the service handle.
  pub async fn connect(config: Config, persist: bool) -> Self {
    let service = HttpTransport::probe(&config.jira.url)
      .await
      .map(SoapClient::new);
    Self::build(config, service, persist)
  }
}

impl<T: SoapTransport> JiraSoapBridge<T> {
  pub fn with_transport(config: Config, transport: T, persist: bool) -> Self {
    Self::build(config, Some(SoapClient::new(transport)), persist)
  }

  /// A bridge without a service handle.
  pub fn uninitialized(config: Config, persist: bool) -> Self {
    Self::build(config, None, persist)
  }

  fn build(config: Config, service: Option<SoapClient<T>>, persist: bool) -> Self {
    let cache = open_cache(&config, persist);
    Self {
      base_url: config.jira.url.clone(),
      token: config.token.clone(),
      service,
      config,
      persist,
      cache,
    }
  }

  pub fn base_url(&self) -> &str {
    &self.base_url
  }

  pub fn token(&self) -> Option<&str> {
    self.token.as_deref()
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn is_initialized(&self) -> bool {
    self.service.is_some()
  }

  // ==========================================================================
  // Session
  // ==========================================================================

  /// Check that the service is reachable and the held token is accepted.
  ///
  /// A rejected token is dropped from the bridge and from the configuration.
  pub async fn ping(&mut self) -> Result<bool> {
    if self.service.is_none() {
      return Ok(false);
    }
    match self.call("getIssueTypes", vec![]).await {
      Ok(_) => Ok(true),
      Err(e) if e.is_fault() => {
        debug!(error = %e, "token rejected");
        self.token = None;
        self.config.token = None;
        if self.persist {
          self.save_config()?;
        }
        Ok(false)
      }
      Err(e) => Err(e),
    }
  }

  /// Obtain a token, reusing the held one while the service still accepts it.
  pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
    if self.service.is_none() {
      return Err(BridgeError::Initialization);
    }

    let result = self.authenticate(username, password).await;

    if self.persist {
      self.config.token = self.token.clone();
      if let Err(e) = self.save_config() {
        if result.is_ok() {
          return Err(e);
        }
        warn!(error = %e, "failed to persist cleared token");
      }
    }
    result
  }

  async fn authenticate(&mut self, username: &str, password: &str) -> Result<()> {
    if self.token.is_some() && self.ping().await? {
      debug!("reusing existing token");
      return Ok(());
    }

    let service = self.service()?;
    let response = service
      .invoke("login", &[username.into(), password.into()])
      .await;

    match response {
      Ok(Some(Value::String(token))) => {
        info!(username, "logged in");
        self.token = Some(token);
        self.config.token = self.token.clone();
        Ok(())
      }
      Ok(_) => {
        self.token = None;
        Err(BridgeError::Authentication)
      }
      Err(e) if e.is_fault() => {
        debug!(error = %e, "login rejected");
        self.token = None;
        Err(BridgeError::Authentication)
      }
      Err(e) => {
        self.token = None;
        Err(e)
      }
    }
  }

  // ==========================================================================
  // Issues
  // ==========================================================================

  /// Get an issue by key; `None` if the service reports a fault for it.
  pub async fn get_issue(&self, key: &str) -> Result<Option<Record>> {
    match self.call("getIssue", vec![key.into()]).await {
      Ok(Some(value)) => into_record(value).map(Some),
      Ok(None) => Ok(None),
      Err(e) if e.is_fault() => {
        debug!(key, error = %e, "issue lookup failed");
        Ok(None)
      }
      Err(e) => Err(e),
    }
  }

  /// Sub-tasks of an issue.
  pub async fn get_children(&self, key: &str) -> Result<Vec<Record>> {
    self.call_list("getSubTasks", vec![key.into()]).await
  }

  pub async fn search_issues_jql(&self, query: &str, limit: i64) -> Result<Vec<Record>> {
    self
      .call_list(
        "getIssuesFromJqlSearch",
        vec![query.into(), limit.into()],
      )
      .await
  }

  /// Free text search, optionally restricted to one project.
  ///
  /// The limit only applies to project searches; the unrestricted remote
  /// search takes none.
  pub async fn search_issues(
    &self,
    free_text: &str,
    project: Option<&str>,
    limit: i64,
  ) -> Result<Vec<Record>> {
    match project.filter(|p| !p.is_empty()) {
      None => {
        self
          .call_list("getIssuesFromTextSearch", vec![free_text.into()])
          .await
      }
      Some(project) => {
        self
          .call_list(
            "getIssuesFromTextSearchWithProject",
            vec![
              SoapValue::strings([project]),
              free_text.into(),
              limit.into(),
            ],
          )
          .await
      }
    }
  }

  /// Issues matched by the named filters, concatenated in argument order.
  pub async fn get_issues_by_filter(&self, names: &[&str]) -> Result<Vec<Record>> {
    let filters = self.get_filters().await?;
    let mut issues = Vec::new();
    for name in names {
      let id = filters
        .get(&name.to_lowercase())
        .and_then(|f| field(f, "id"))
        .ok_or_else(|| BridgeError::Usage(format!("filter {} not found", name)))?;
      issues.extend(self.call_list("getIssuesFromFilter", vec![id.into()]).await?);
    }
    Ok(issues)
  }

  pub async fn create_issue(&self, issue: &NewIssue) -> Result<Record> {
    let priorities = self.get_priorities().await?;
    let priority_id = lookup_id(&priorities, &issue.priority, "priority")?;

    let issue_type = issue.issue_type.to_lowercase();
    let types = match issue.parent {
      Some(_) => self.get_subtask_issue_types().await?,
      None => self.get_issue_types().await?,
    };
    let type_id = lookup_id(&types, &issue_type, "issue type")?;

    let mut fields = vec![
      ("project".to_string(), SoapValue::str(issue.project.to_uppercase())),
      ("type".to_string(), SoapValue::str(type_id)),
      ("summary".to_string(), SoapValue::str(&issue.summary)),
      ("description".to_string(), SoapValue::str(&issue.description)),
      ("priority".to_string(), SoapValue::str(priority_id)),
    ];
    if let Some(assignee) = non_empty(&issue.assignee) {
      fields.push(("assignee".to_string(), SoapValue::str(assignee)));
    }
    if let Some(reporter) = non_empty(&issue.reporter) {
      fields.push(("reporter".to_string(), SoapValue::str(reporter)));
    }
    if issue_type == "epic" {
      fields.push((
        "customFieldValues".to_string(),
        SoapValue::Array {
          item_type: "beans:RemoteCustomFieldValue",
          items: vec![SoapValue::Struct {
            type_name: "RemoteCustomFieldValue",
            fields: vec![
              (
                "customfieldId".to_string(),
                SoapValue::str(&self.config.jira.epic_name_field),
              ),
              ("key".to_string(), SoapValue::Null),
              ("values".to_string(), SoapValue::strings([issue.summary.as_str()])),
            ],
          }],
        },
      ));
    }

    let remote_issue = SoapValue::Struct {
      type_name: "RemoteIssue",
      fields,
    };

    self
      .submit_issue(issue, remote_issue)
      .await
      .map_err(|e| match e {
        BridgeError::Fault { message, .. } => BridgeError::Cli(message),
        other => other,
      })
  }

  async fn submit_issue(&self, issue: &NewIssue, remote_issue: SoapValue) -> Result<Record> {
    let mut created = match &issue.parent {
      Some(parent) => {
        self
          .call_record(
            "createIssueWithParent",
            vec![remote_issue, parent.as_str().into()],
          )
          .await?
      }
      None => self.call_record("createIssue", vec![remote_issue]).await?,
    };
    let key = field(&created, "key")
      .ok_or_else(|| BridgeError::Protocol("created issue has no key".to_string()))?;
    info!(%key, "created issue");

    if let Some(assignee) = non_empty(&issue.assignee) {
      created = self.assign_issue(&key, assignee).await?;
    }
    if let Some(reporter) = non_empty(&issue.reporter) {
      created = self.change_reporter(&key, reporter).await?;
    }
    Ok(created)
  }

  /// Set fields of an issue; each value replaces the field's value list.
  pub async fn update_issue(&self, key: &str, fields: &[(&str, &str)]) -> Result<Record> {
    let values = fields
      .iter()
      .map(|(id, value)| SoapValue::Struct {
        type_name: "RemoteFieldValue",
        fields: vec![
          ("id".to_string(), SoapValue::str(*id)),
          ("values".to_string(), SoapValue::strings([*value])),
        ],
      })
      .collect();

    self
      .call_record(
        "updateIssue",
        vec![
          key.into(),
          SoapValue::Array {
            item_type: "beans:RemoteFieldValue",
            items: values,
          },
        ],
      )
      .await
  }

  pub async fn assign_issue(&self, key: &str, assignee: &str) -> Result<Record> {
    self.update_issue(key, &[("assignee", assignee)]).await
  }

  pub async fn change_reporter(&self, key: &str, reporter: &str) -> Result<Record> {
    self.update_issue(key, &[("reporter", reporter)]).await
  }

  // ==========================================================================
  // Comments and transitions
  // ==========================================================================

  pub async fn get_issue_comments(&self, key: &str) -> Result<Vec<Record>> {
    self.call_list("getComments", vec![key.into()]).await
  }

  pub async fn add_comment(&self, key: &str, body: &str) -> Result<()> {
    let comment = SoapValue::Struct {
      type_name: "RemoteComment",
      fields: vec![("body".to_string(), SoapValue::str(body))],
    };
    self.call("addComment", vec![key.into(), comment]).await?;
    Ok(())
  }

  /// Workflow actions currently available on an issue, keyed by lowercase name.
  pub async fn get_available_transitions(&self, key: &str) -> Result<RecordIndex> {
    let actions = self
      .call_list("getAvailableActions", vec![key.into()])
      .await?;
    if actions.is_empty() {
      return Err(BridgeError::Cli(format!(
        "No transitions found for issue {}",
        key
      )));
    }
    Ok(index_by_name(actions, true))
  }

  /// Move an issue through the named workflow action, then add `comment`
  /// if it is not empty.
  pub async fn transition_issue(
    &self,
    key: &str,
    transition: &str,
    comment: &str,
  ) -> Result<Record> {
    let transitions = self.get_available_transitions(key).await?;
    let action_id = transitions
      .get(&transition.to_lowercase())
      .and_then(|t| field(t, "id"))
      .ok_or_else(|| {
        let names: Vec<&str> = transitions.keys().map(String::as_str).collect();
        BridgeError::Cli(format!(
          "Invalid transition '{}'. Use one of [{}]",
          transition,
          names.join(",")
        ))
      })?;

    let issue = self
      .call_record(
        "progressWorkflowAction",
        vec![
          key.into(),
          action_id.into(),
          SoapValue::Array {
            item_type: "beans:RemoteFieldValue",
            items: Vec::new(),
          },
        ],
      )
      .await?;

    if !comment.trim().is_empty() {
      self.add_comment(key, comment).await?;
    }
    Ok(issue)
  }

  // ==========================================================================
  // Reference data
  // ==========================================================================

  pub async fn get_issue_types(&self) -> Result<RecordIndex> {
    self
      .cached_index(ReferenceData::IssueTypes, &["getIssueTypes"], true)
      .await
  }

  pub async fn get_subtask_issue_types(&self) -> Result<RecordIndex> {
    self
      .cached_index(ReferenceData::SubtaskIssueTypes, &["getSubTaskIssueTypes"], true)
      .await
  }

  pub async fn get_priorities(&self) -> Result<RecordIndex> {
    self
      .cached_index(ReferenceData::Priorities, &["getPriorities"], true)
      .await
  }

  pub async fn get_statuses(&self) -> Result<RecordIndex> {
    self
      .cached_index(ReferenceData::Statuses, &["getStatuses"], true)
      .await
  }

  /// Resolutions, keyed by their exact name.
  pub async fn get_resolutions(&self) -> Result<RecordIndex> {
    self
      .cached_index(ReferenceData::Resolutions, &["getResolutions"], false)
      .await
  }

  /// Saved and favourite filters; a favourite wins over a saved filter of
  /// the same name.
  pub async fn get_filters(&self) -> Result<RecordIndex> {
    self
      .cached_index(
        ReferenceData::Filters,
        &["getSavedFilters", "getFavouriteFilters"],
        true,
      )
      .await
  }

  pub async fn get_projects(&self) -> Result<Vec<Record>> {
    let key = CachedCall::new(&self.base_url, ReferenceData::Projects);
    let result = self
      .cache
      .fetch(&key, || self.call_list("getProjectsNoSchemes", vec![]))
      .await?;
    Ok(result.data)
  }

  pub async fn get_components(&self, project: &str) -> Result<Vec<Record>> {
    self.call_list("getComponents", vec![project.into()]).await
  }

  pub fn clear_cache(&self) -> Result<()> {
    self
      .cache
      .clear()
      .map_err(|e| BridgeError::Cache(e.to_string()))
  }

  async fn cached_index(
    &self,
    data: ReferenceData,
    methods: &[&str],
    lowercase: bool,
  ) -> Result<RecordIndex> {
    let key = CachedCall::new(&self.base_url, data);
    let result = self
      .cache
      .fetch(&key, || async {
        let mut records = Vec::new();
        for method in methods {
          records.extend(self.call_list(method, vec![]).await?);
        }
        Ok::<_, BridgeError>(index_by_name(records, lowercase))
      })
      .await?;
    debug!(data = data.name(), source = ?result.source, "reference data");
    Ok(result.data)
  }

  // ==========================================================================
  // Remote call helpers
  // ==========================================================================

  fn service(&self) -> Result<&SoapClient<T>> {
    self.service.as_ref().ok_or(BridgeError::Initialization)
  }

  /// Invoke `method` with the token prepended to `args`.
  async fn call(&self, method: &str, args: Vec<SoapValue>) -> Result<Option<Value>> {
    let service = self.service()?;
    let token = match &self.token {
      Some(token) => SoapValue::str(token.as_str()),
      None => SoapValue::Null,
    };
    let mut full_args = Vec::with_capacity(args.len() + 1);
    full_args.push(token);
    full_args.extend(args);
    service.invoke(method, &full_args).await
  }

  async fn call_list(&self, method: &str, args: Vec<SoapValue>) -> Result<Vec<Record>> {
    into_records(self.call(method, args).await?)
  }

  async fn call_record(&self, method: &str, args: Vec<SoapValue>) -> Result<Record> {
    match self.call(method, args).await? {
      Some(value) => into_record(value),
      None => Err(BridgeError::Protocol(format!("{} returned nothing", method))),
    }
  }

  fn save_config(&self) -> Result<()> {
    self
      .config
      .save()
      .map_err(|e| BridgeError::Config(e.to_string()))
  }
}

fn open_cache(config: &Config, persist: bool) -> CacheLayer {
  let stale_time = Duration::minutes(config.cache.stale_minutes);

  let cache = if !config.cache.enabled {
    CacheLayer::new(NoopStorage)
  } else if persist {
    match SqliteStorage::open(config.cache.path.as_deref()) {
      Ok(storage) => CacheLayer::new(storage),
      Err(e) => {
        warn!(error = %e, "falling back to in-memory cache");
        CacheLayer::new(MemoryStorage::new())
      }
    }
  } else {
    CacheLayer::new(MemoryStorage::new())
  };

  cache.with_stale_time(stale_time)
}

fn lookup_id(index: &RecordIndex, name: &str, what: &str) -> Result<String> {
  index
    .get(&name.to_lowercase())
    .and_then(|r| field(r, "id"))
    .ok_or_else(|| {
      let names: Vec<&str> = index.keys().map(String::as_str).collect();
      BridgeError::Usage(format!(
        "Invalid {} '{}'. Use one of [{}]",
        what,
        name,
        names.join(",")
      ))
    })
}

fn non_empty(value: &Option<String>) -> Option<&str> {
  value.as_deref().filter(|v| !v.is_empty())
}
