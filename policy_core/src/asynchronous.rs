//! Async wrapper around [`PolicyManager`].
//!
//! Each call runs the blocking operation on tokio's blocking pool, so a
//! writer waiting in the fair lock queue never stalls the async runtime.

use tracing::debug;

use crate::error::Result;
use crate::manager::PolicyManager;
use crate::rule::{collect_rules, Rule};

#[derive(Debug, Clone, Default)]
pub struct AsyncPolicyManager {
    inner: PolicyManager,
}

impl AsyncPolicyManager {
    pub fn new(inner: PolicyManager) -> Self {
        Self { inner }
    }

    /// Blocking handle sharing the same model.
    pub fn blocking(&self) -> &PolicyManager {
        &self.inner
    }

    /// Run `f` against the manager on the blocking pool.
    pub async fn run<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&PolicyManager) -> R + Send + 'static,
        R: Send + 'static,
    {
        let manager = self.inner.clone();
        let out = tokio::task::spawn_blocking(move || f(&manager)).await?;
        Ok(out)
    }

    pub async fn get_policy(&self) -> Result<Vec<Rule>> {
        self.run(|m| m.get_policy()).await
    }

    pub async fn get_grouping_policy(&self) -> Result<Vec<Rule>> {
        self.run(|m| m.get_grouping_policy()).await
    }

    pub async fn has_policy(&self, rule: impl Into<Rule>) -> Result<bool> {
        let rule = rule.into();
        self.run(move |m| m.has_policy(rule)).await
    }

    pub async fn add_policy(&self, rule: impl Into<Rule>) -> Result<bool> {
        let rule = rule.into();
        debug!(%rule, "async add_policy");
        self.run(move |m| m.add_policy(rule)).await?
    }

    pub async fn remove_policy(&self, rule: impl Into<Rule>) -> Result<bool> {
        let rule = rule.into();
        self.run(move |m| m.remove_policy(rule)).await?
    }

    pub async fn add_grouping_policy(&self, rule: impl Into<Rule>) -> Result<bool> {
        let rule = rule.into();
        debug!(%rule, "async add_grouping_policy");
        self.run(move |m| m.add_grouping_policy(rule)).await?
    }

    pub async fn remove_grouping_policy(&self, rule: impl Into<Rule>) -> Result<bool> {
        let rule = rule.into();
        self.run(move |m| m.remove_grouping_policy(rule)).await?
    }

    pub async fn add_named_policy(&self, ptype: &str, rule: impl Into<Rule>) -> Result<bool> {
        let (ptype, rule) = (ptype.to_string(), rule.into());
        self.run(move |m| m.add_named_policy(&ptype, rule)).await?
    }

    pub async fn remove_named_policy(&self, ptype: &str, rule: impl Into<Rule>) -> Result<bool> {
        let (ptype, rule) = (ptype.to_string(), rule.into());
        self.run(move |m| m.remove_named_policy(&ptype, rule)).await?
    }

    pub async fn add_policies<I, R>(&self, rules: I) -> Result<bool>
    where
        I: IntoIterator<Item = R>,
        R: Into<Rule>,
    {
        let rules = collect_rules(rules);
        self.run(move |m| m.add_policies(rules)).await?
    }

    pub async fn remove_policies<I, R>(&self, rules: I) -> Result<bool>
    where
        I: IntoIterator<Item = R>,
        R: Into<Rule>,
    {
        let rules = collect_rules(rules);
        self.run(move |m| m.remove_policies(rules)).await?
    }

    pub async fn update_policy(
        &self,
        old_rule: impl Into<Rule>,
        new_rule: impl Into<Rule>,
    ) -> Result<bool> {
        let (old_rule, new_rule) = (old_rule.into(), new_rule.into());
        self.run(move |m| m.update_policy(old_rule, new_rule)).await?
    }

    pub async fn update_policies<I, J, R, S>(&self, old_rules: I, new_rules: J) -> Result<bool>
    where
        I: IntoIterator<Item = R>,
        J: IntoIterator<Item = S>,
        R: Into<Rule>,
        S: Into<Rule>,
    {
        let (olds, news) = (collect_rules(old_rules), collect_rules(new_rules));
        self.run(move |m| m.update_policies(olds, news)).await?
    }

    pub async fn get_filtered_policy(
        &self,
        field_index: usize,
        field_values: &[&str],
    ) -> Result<Vec<Rule>> {
        let values = owned(field_values);
        self.run(move |m| m.get_filtered_policy(field_index, &borrowed(&values)))
            .await?
    }

    pub async fn remove_filtered_policy(
        &self,
        field_index: usize,
        field_values: &[&str],
    ) -> Result<bool> {
        let values = owned(field_values);
        self.run(move |m| m.remove_filtered_policy(field_index, &borrowed(&values)))
            .await?
    }

    pub async fn has_grouping_policy(&self, rule: impl Into<Rule>) -> Result<bool> {
        let rule = rule.into();
        self.run(move |m| m.has_grouping_policy(rule)).await
    }

    pub async fn add_grouping_policies<I, R>(&self, rules: I) -> Result<bool>
    where
        I: IntoIterator<Item = R>,
        R: Into<Rule>,
    {
        let rules = collect_rules(rules);
        self.run(move |m| m.add_grouping_policies(rules)).await?
    }

    pub async fn remove_grouping_policies<I, R>(&self, rules: I) -> Result<bool>
    where
        I: IntoIterator<Item = R>,
        R: Into<Rule>,
    {
        let rules = collect_rules(rules);
        self.run(move |m| m.remove_grouping_policies(rules)).await?
    }

    pub async fn update_grouping_policy(
        &self,
        old_rule: impl Into<Rule>,
        new_rule: impl Into<Rule>,
    ) -> Result<bool> {
        let (old_rule, new_rule) = (old_rule.into(), new_rule.into());
        self.run(move |m| m.update_grouping_policy(old_rule, new_rule))
            .await?
    }

    pub async fn get_filtered_grouping_policy(
        &self,
        field_index: usize,
        field_values: &[&str],
    ) -> Result<Vec<Rule>> {
        let values = owned(field_values);
        self.run(move |m| m.get_filtered_grouping_policy(field_index, &borrowed(&values)))
            .await?
    }

    pub async fn remove_filtered_grouping_policy(
        &self,
        field_index: usize,
        field_values: &[&str],
    ) -> Result<bool> {
        let values = owned(field_values);
        self.run(move |m| m.remove_filtered_grouping_policy(field_index, &borrowed(&values)))
            .await?
    }

    pub async fn has_role_for_user(&self, user: &str, role: &str) -> Result<bool> {
        let (user, role) = (user.to_string(), role.to_string());
        self.run(move |m| m.has_role_for_user(&user, &role)).await
    }

    pub async fn get_roles_for_user(&self, user: &str) -> Result<Vec<String>> {
        let user = user.to_string();
        self.run(move |m| m.get_roles_for_user(&user)).await
    }
}

fn owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn borrowed(values: &[String]) -> Vec<&str> {
    values.iter().map(String::as_str).collect()
}

impl From<PolicyManager> for AsyncPolicyManager {
    fn from(inner: PolicyManager) -> Self {
        Self::new(inner)
    }
}
