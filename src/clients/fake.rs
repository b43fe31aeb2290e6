//! In-process fakes of the external services.
//!
//! Each fake serves canned responses, records mutating calls and can be told
//! to fail, so rules, notifiers and whole audit passes can run without a
//! network.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{
    Build, BuildRef, BuildbucketClient, Change, Clients, Comment, Commit, GerritClient,
    GitilesClient, Issue, IssuesListRequest, LogRequest, MonorailClient, Release, ReleaseClient,
};
use crate::error::ClientError;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
pub struct FakeGerrit {
    by_commit: Mutex<HashMap<String, Vec<Change>>>,
    details: Mutex<HashMap<String, Change>>,
    pure_reverts: Mutex<HashMap<String, bool>>,
    error: Mutex<Option<ClientError>>,
    reviews: Mutex<Vec<(String, String)>>,
}

impl FakeGerrit {
    /// Make `commit:<hash>` return `change`, and its details resolvable by
    /// change id and change number.
    pub fn add_change_for_commit(&self, hash: &str, change: Change) {
        lock(&self.by_commit)
            .entry(hash.to_string())
            .or_default()
            .push(change.clone());
        self.add_change(change);
    }

    /// Make a change resolvable by id and number without tying it to a commit.
    pub fn add_change(&self, change: Change) {
        let mut details = lock(&self.details);
        details.insert(change.change_number.to_string(), change.clone());
        details.insert(change.change_id.clone(), change);
    }

    pub fn set_pure_revert(&self, change_id: &str, pure: bool) {
        lock(&self.pure_reverts).insert(change_id.to_string(), pure);
    }

    pub fn fail_with(&self, error: ClientError) {
        *lock(&self.error) = Some(error);
    }

    pub fn reviews(&self) -> Vec<(String, String)> {
        lock(&self.reviews).clone()
    }

    fn check_error(&self) -> Result<(), ClientError> {
        match lock(&self.error).as_ref() {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl GerritClient for FakeGerrit {
    async fn change_query(&self, query: &str) -> Result<Vec<Change>, ClientError> {
        self.check_error()?;
        let hash = query.strip_prefix("commit:").unwrap_or(query);
        Ok(lock(&self.by_commit).get(hash).cloned().unwrap_or_default())
    }

    async fn change_details(
        &self,
        change_id: &str,
        _options: &[&str],
    ) -> Result<Change, ClientError> {
        self.check_error()?;
        lock(&self.details)
            .get(change_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("change {change_id}")))
    }

    async fn is_change_pure_revert(&self, change_id: &str) -> Result<bool, ClientError> {
        self.check_error()?;
        Ok(lock(&self.pure_reverts)
            .get(change_id)
            .copied()
            .unwrap_or(false))
    }

    async fn set_review(
        &self,
        change_id: &str,
        _revision: &str,
        message: &str,
    ) -> Result<(), ClientError> {
        self.check_error()?;
        lock(&self.reviews).push((change_id.to_string(), message.to_string()));
        Ok(())
    }
}

type LogKey = (String, Option<String>);

#[derive(Default)]
pub struct FakeGitiles {
    logs: Mutex<HashMap<LogKey, Result<Vec<Commit>, ClientError>>>,
    refs: Mutex<HashMap<String, String>>,
    requests: Mutex<Vec<LogRequest>>,
}

impl FakeGitiles {
    /// Serve `commits` for a log of `committish` excluding ancestors of
    /// `exclude`. Unregistered logs fail with `NotFound`.
    pub fn set_log(&self, committish: &str, exclude: Option<&str>, commits: Vec<Commit>) {
        lock(&self.logs).insert(
            (committish.to_string(), exclude.map(str::to_string)),
            Ok(commits),
        );
    }

    pub fn set_log_error(&self, committish: &str, exclude: Option<&str>, error: ClientError) {
        lock(&self.logs).insert(
            (committish.to_string(), exclude.map(str::to_string)),
            Err(error),
        );
    }

    pub fn set_ref(&self, ref_name: &str, revision: &str) {
        lock(&self.refs).insert(ref_name.to_string(), revision.to_string());
    }

    pub fn requests(&self) -> Vec<LogRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl GitilesClient for FakeGitiles {
    async fn log(&self, _host: &str, request: &LogRequest) -> Result<Vec<Commit>, ClientError> {
        lock(&self.requests).push(request.clone());
        let key = (
            request.committish.clone(),
            request.exclude_ancestors_of.clone(),
        );
        match lock(&self.logs).get(&key) {
            Some(Ok(commits)) => Ok(commits.iter().take(request.page_size).cloned().collect()),
            Some(Err(e)) => Err(e.clone()),
            None => Err(ClientError::NotFound(format!(
                "log of {}",
                request.committish
            ))),
        }
    }

    async fn refs(
        &self,
        _host: &str,
        _project: &str,
        refs_path: &str,
    ) -> Result<HashMap<String, String>, ClientError> {
        Ok(lock(&self.refs)
            .iter()
            .filter(|(name, _)| name.starts_with(refs_path))
            .map(|(name, rev)| (name.clone(), rev.clone()))
            .collect())
    }
}

pub struct FakeMonorail {
    issues: Mutex<BTreeMap<i64, Issue>>,
    comments: Mutex<HashMap<i64, Vec<Comment>>>,
    next_id: Mutex<i64>,
    inserted: Mutex<Vec<Issue>>,
    posted: Mutex<Vec<(i64, Comment)>>,
    reject_owners: Mutex<bool>,
    error: Mutex<Option<ClientError>>,
    comment_failures: Mutex<HashMap<i64, ClientError>>,
}

impl Default for FakeMonorail {
    fn default() -> Self {
        Self {
            issues: Mutex::default(),
            comments: Mutex::default(),
            next_id: Mutex::new(12345),
            inserted: Mutex::default(),
            posted: Mutex::default(),
            reject_owners: Mutex::new(false),
            error: Mutex::default(),
            comment_failures: Mutex::default(),
        }
    }
}

impl FakeMonorail {
    /// Id the next filed issue will get.
    pub fn set_next_id(&self, id: i64) {
        *lock(&self.next_id) = id;
    }

    /// Seed an existing issue.
    pub fn add_issue(&self, issue: Issue) {
        lock(&self.issues).insert(issue.id, issue);
    }

    pub fn add_comment(&self, issue_id: i64, comment: Comment) {
        lock(&self.comments).entry(issue_id).or_default().push(comment);
    }

    /// Reject any insert that names an owner.
    pub fn reject_owners(&self, reject: bool) {
        *lock(&self.reject_owners) = reject;
    }

    pub fn fail_with(&self, error: ClientError) {
        *lock(&self.error) = Some(error);
    }

    /// Fail the next comment on `issue_id` only.
    pub fn fail_next_comment(&self, issue_id: i64, error: ClientError) {
        lock(&self.comment_failures).insert(issue_id, error);
    }

    pub fn inserted(&self) -> Vec<Issue> {
        lock(&self.inserted).clone()
    }

    pub fn posted_comments(&self) -> Vec<(i64, Comment)> {
        lock(&self.posted).clone()
    }

    /// Number of calls that changed tracker state.
    pub fn mutations(&self) -> usize {
        lock(&self.inserted).len() + lock(&self.posted).len()
    }

    fn check_error(&self) -> Result<(), ClientError> {
        match lock(&self.error).as_ref() {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MonorailClient for FakeMonorail {
    async fn insert_issue(&self, issue: &Issue) -> Result<Issue, ClientError> {
        self.check_error()?;
        if issue.owner.is_some() && *lock(&self.reject_owners) {
            return Err(ClientError::Rejected("issue owner is not a member".to_string()));
        }
        let mut next_id = lock(&self.next_id);
        let filed = Issue {
            id: *next_id,
            ..issue.clone()
        };
        *next_id += 1;
        lock(&self.issues).insert(filed.id, filed.clone());
        lock(&self.inserted).push(filed.clone());
        Ok(filed)
    }

    async fn insert_comment(
        &self,
        _project_id: &str,
        issue_id: i64,
        comment: &Comment,
    ) -> Result<(), ClientError> {
        self.check_error()?;
        if let Some(e) = lock(&self.comment_failures).remove(&issue_id) {
            return Err(e);
        }
        lock(&self.comments)
            .entry(issue_id)
            .or_default()
            .push(comment.clone());
        lock(&self.posted).push((issue_id, comment.clone()));
        Ok(())
    }

    async fn issues_list(&self, request: &IssuesListRequest) -> Result<Vec<Issue>, ClientError> {
        self.check_error()?;
        Ok(lock(&self.issues)
            .values()
            .filter(|i| i.project_id == request.project_id)
            .filter(|i| request.include_closed || !i.status.is_closed())
            .cloned()
            .collect())
    }

    async fn list_comments(
        &self,
        _project_id: &str,
        issue_id: i64,
    ) -> Result<Vec<Comment>, ClientError> {
        self.check_error()?;
        Ok(lock(&self.comments)
            .get(&issue_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_issue(&self, _project_id: &str, issue_id: i64) -> Result<Issue, ClientError> {
        self.check_error()?;
        lock(&self.issues)
            .get(&issue_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("issue {issue_id}")))
    }
}

#[derive(Default)]
pub struct FakeBuildbucket {
    builds: Mutex<Vec<(BuildRef, Build)>>,
}

impl FakeBuildbucket {
    pub fn add_build(&self, build_ref: BuildRef, build: Build) {
        lock(&self.builds).push((build_ref, build));
    }
}

#[async_trait]
impl BuildbucketClient for FakeBuildbucket {
    async fn get_build(&self, build: &BuildRef) -> Result<Build, ClientError> {
        lock(&self.builds)
            .iter()
            .find(|(r, _)| r == build)
            .map(|(_, b)| b.clone())
            .ok_or_else(|| ClientError::NotFound(format!("build {build:?}")))
    }
}

#[derive(Default)]
pub struct FakeReleases {
    releases: Mutex<Vec<Release>>,
}

impl FakeReleases {
    pub fn set_releases(&self, releases: Vec<Release>) {
        *lock(&self.releases) = releases;
    }
}

#[async_trait]
impl ReleaseClient for FakeReleases {
    async fn active_releases(&self) -> Result<Vec<Release>, ClientError> {
        Ok(lock(&self.releases).clone())
    }
}

/// Handles to every fake, plus the [`Clients`] bundle wired to them.
#[derive(Default, Clone)]
pub struct FakeClients {
    pub gerrit: Arc<FakeGerrit>,
    pub gitiles: Arc<FakeGitiles>,
    pub monorail: Arc<FakeMonorail>,
    pub buildbucket: Arc<FakeBuildbucket>,
    pub releases: Arc<FakeReleases>,
}

impl FakeClients {
    pub const SERVICE_ACCOUNT: &'static str = "audit-app@appspot.gserviceaccount.com";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn clients(&self) -> Clients {
        Clients {
            service_account: Self::SERVICE_ACCOUNT.to_string(),
            gerrit: self.gerrit.clone(),
            gitiles: self.gitiles.clone(),
            monorail: self.monorail.clone(),
            buildbucket: self.buildbucket.clone(),
            releases: self.releases.clone(),
        }
    }
}
