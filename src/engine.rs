use crate::actions::{self, ActionResult};
use crate::error::RuleError;
use crate::fields;
use crate::predicates;
use crate::rules::{Action, Aggregation, Condition, Rule};
use crate::store::{EmailRecord, RecordStore, StoreError};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

/// Combine per-condition results. An empty ALL matches, an empty ANY doesn't.
pub fn aggregate(results: impl IntoIterator<Item = bool>, mode: Aggregation) -> bool {
    let mut results = results.into_iter();
    match mode {
        Aggregation::All => results.all(|r| r),
        Aggregation::Any => results.any(|r| r),
    }
}

/// What happened when one rule met one email.
#[derive(Debug)]
pub enum RuleOutcome {
    NotMatched,
    /// Matched and every action succeeded
    Completed { actions: usize },
    /// Matched but at least one action failed
    PartiallyFailed {
        succeeded: usize,
        failures: Vec<(Action, RuleError)>,
    },
    /// Evaluation aborted; the rule was skipped for this email
    Errored(RuleError),
}

impl RuleOutcome {
    pub fn is_match(&self) -> bool {
        matches!(
            self,
            RuleOutcome::Completed { .. } | RuleOutcome::PartiallyFailed { .. }
        )
    }
}

#[derive(Debug)]
pub struct RuleRun {
    /// Position of the rule in the loaded document
    pub rule_index: usize,
    pub rule: String,
    pub email_id: String,
    pub outcome: RuleOutcome,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub runs: Vec<RuleRun>,
    pub emails_processed: usize,
    /// Emails abandoned because their stored data was corrupt
    pub emails_skipped: usize,
}

impl RunReport {
    pub fn matches(&self) -> impl Iterator<Item = &RuleRun> {
        self.runs.iter().filter(|r| r.outcome.is_match())
    }

    /// Matches for the rule at `rule_index`; names may repeat across rules.
    pub fn matches_for(&self, rule_index: usize) -> usize {
        self.matches().filter(|r| r.rule_index == rule_index).count()
    }

    /// Runs that recorded an error, either during evaluation or in an action.
    pub fn failures(&self) -> impl Iterator<Item = &RuleRun> {
        self.runs.iter().filter(|r| {
            matches!(
                r.outcome,
                RuleOutcome::Errored(_) | RuleOutcome::PartiallyFailed { .. }
            )
        })
    }

    pub fn actions_applied(&self) -> usize {
        self.runs
            .iter()
            .map(|r| match r.outcome {
                RuleOutcome::Completed { actions } => actions,
                RuleOutcome::PartiallyFailed { succeeded, .. } => succeeded,
                _ => 0,
            })
            .sum()
    }
}

/// Evaluates rules in declared order against every stored email.
pub struct RuleEngine<'a> {
    rules: &'a [Rule],
    now: DateTime<Utc>,
}

impl<'a> RuleEngine<'a> {
    pub fn new(rules: &'a [Rule]) -> Self {
        Self {
            rules,
            now: Utc::now(),
        }
    }

    /// Pin the instant relative dates are resolved against.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Load every email from the store and run all rules over them.
    ///
    /// Only failing to read the store aborts the run; every other failure is
    /// recorded in the report and processing carries on.
    pub fn process<S: RecordStore + ?Sized>(&self, store: &mut S) -> Result<RunReport, StoreError> {
        let emails = store.get_all_emails()?;
        info!(
            rules = self.rules.len(),
            emails = emails.len(),
            "Evaluating rules"
        );
        Ok(self.process_emails(store, emails))
    }

    pub fn process_emails<S: RecordStore + ?Sized>(
        &self,
        store: &mut S,
        emails: Vec<EmailRecord>,
    ) -> RunReport {
        let mut report = RunReport::default();

        for mut email in emails {
            report.emails_processed += 1;
            for (rule_index, rule) in self.rules.iter().enumerate() {
                let outcome = match self.evaluate(rule, &email) {
                    Ok(false) => RuleOutcome::NotMatched,
                    Ok(true) => self.execute(store, rule, &mut email),
                    Err(e) => {
                        let record_error = e.is_record_error();
                        warn!(rule = %rule.name, email_id = %email.id, error = %e, "Rule evaluation failed");
                        report.runs.push(RuleRun {
                            rule_index,
                            rule: rule.name.clone(),
                            email_id: email.id.clone(),
                            outcome: RuleOutcome::Errored(e),
                        });
                        if record_error {
                            warn!(email_id = %email.id, "Skipping email with corrupt data");
                            report.emails_skipped += 1;
                            break;
                        }
                        continue;
                    }
                };
                report.runs.push(RuleRun {
                    rule_index,
                    rule: rule.name.clone(),
                    email_id: email.id.clone(),
                    outcome,
                });
            }
        }

        report
    }

    /// Decide whether `rule` matches `email`. Conditions are not short-circuited
    /// on their results, so a broken condition fails the rule even when an
    /// earlier condition already decided it. The first error is returned.
    pub fn evaluate(&self, rule: &Rule, email: &EmailRecord) -> Result<bool, RuleError> {
        let results = rule
            .conditions
            .iter()
            .map(|condition| {
                self.evaluate_condition(condition, email).inspect_err(|e| {
                    debug!(
                        rule = %rule.name,
                        email_id = %email.id,
                        field = %condition.field,
                        predicate = %condition.predicate,
                        value = %condition.value,
                        error = %e,
                        "Condition failed to evaluate"
                    );
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(aggregate(results, rule.aggregation))
    }

    fn evaluate_condition(&self, condition: &Condition, email: &EmailRecord) -> Result<bool, RuleError> {
        predicates::check_supported(condition.field, condition.predicate)?;
        let value = fields::extract(email, condition.field)?;
        predicates::matches(&value, condition.predicate, &condition.value, self.now)
    }

    fn execute<S: RecordStore + ?Sized>(
        &self,
        store: &mut S,
        rule: &Rule,
        email: &mut EmailRecord,
    ) -> RuleOutcome {
        let subject: String = email.subject.chars().take(50).collect();
        info!(rule = %rule.name, email_id = %email.id, subject = %subject, "Rule matched");
        if rule.actions.is_empty() {
            info!(rule = %rule.name, "No actions defined for this rule");
        }

        let mut succeeded = 0;
        let mut failures = Vec::new();
        for action in &rule.actions {
            match actions::apply(store, email, action) {
                ActionResult::Succeeded => succeeded += 1,
                ActionResult::Failed(e) => {
                    warn!(rule = %rule.name, email_id = %email.id, action = %action, error = %e, "Action failed");
                    failures.push((action.clone(), e));
                }
            }
        }

        if failures.is_empty() {
            RuleOutcome::Completed { actions: succeeded }
        } else {
            RuleOutcome::PartiallyFailed {
                succeeded,
                failures,
            }
        }
    }
}
