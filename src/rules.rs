use crate::error::RuleError;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

// --- Rules document (JSON) ---

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleFile {
    rules: Vec<RuleDef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleDef {
    #[serde(default)]
    name: Option<String>,
    /// Aggregation mode, "All" when omitted
    #[serde(default)]
    predicate: Option<String>,
    #[serde(default)]
    conditions: Vec<ConditionDef>,
    #[serde(default)]
    actions: Vec<ActionDef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConditionDef {
    field: String,
    predicate: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ActionDef {
    action: String,
    #[serde(default)]
    destination: Option<String>,
}

// --- Rule model ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    All,
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    From,
    To,
    Subject,
    Message,
    ReceivedDate,
}

/// The value type a field yields, which decides the predicates it accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Date,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    Contains,
    DoesNotContain,
    Equals,
    DoesNotEqual,
    LessThan,
    GreaterThan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub field: Field,
    pub predicate: Predicate,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    MarkRead,
    MarkUnread,
    Move { destination: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub name: String,
    pub aggregation: Aggregation,
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
}

impl Field {
    pub fn kind(self) -> FieldKind {
        match self {
            Field::From | Field::To | Field::Subject | Field::Message => FieldKind::Text,
            Field::ReceivedDate => FieldKind::Date,
        }
    }
}

impl Predicate {
    /// The field kind this predicate compares.
    pub fn kind(self) -> FieldKind {
        match self {
            Predicate::Contains
            | Predicate::DoesNotContain
            | Predicate::Equals
            | Predicate::DoesNotEqual => FieldKind::Text,
            Predicate::LessThan | Predicate::GreaterThan => FieldKind::Date,
        }
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

impl FromStr for Aggregation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "all" => Ok(Aggregation::All),
            "any" => Ok(Aggregation::Any),
            other => Err(format!("unknown rule predicate '{}' (expected All or Any)", other)),
        }
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "from" => Ok(Field::From),
            "to" => Ok(Field::To),
            "subject" => Ok(Field::Subject),
            "message" => Ok(Field::Message),
            "received date" | "received date/time" | "date received" => Ok(Field::ReceivedDate),
            other => Err(format!("unknown field '{}'", other)),
        }
    }
}

impl FromStr for Predicate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "contains" => Ok(Predicate::Contains),
            "does not contain" => Ok(Predicate::DoesNotContain),
            "equals" => Ok(Predicate::Equals),
            "does not equal" => Ok(Predicate::DoesNotEqual),
            "less than" => Ok(Predicate::LessThan),
            "greater than" => Ok(Predicate::GreaterThan),
            other => Err(format!("unknown predicate '{}'", other)),
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Aggregation::All => "All",
            Aggregation::Any => "Any",
        })
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FieldKind::Text => "text",
            FieldKind::Date => "date",
        })
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Field::From => "From",
            Field::To => "To",
            Field::Subject => "Subject",
            Field::Message => "Message",
            Field::ReceivedDate => "Received Date",
        })
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Predicate::Contains => "Contains",
            Predicate::DoesNotContain => "Does not Contain",
            Predicate::Equals => "Equals",
            Predicate::DoesNotEqual => "Does not Equal",
            Predicate::LessThan => "Less than",
            Predicate::GreaterThan => "Greater than",
        })
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} \"{}\"", self.field, self.predicate, self.value)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::MarkRead => f.write_str("Mark as Read"),
            Action::MarkUnread => f.write_str("Mark as Unread"),
            Action::Move { destination } => write!(f, "Move Message to {}", destination),
        }
    }
}

// --- Loading ---

/// Load and validate a rules document. Any invalid rule rejects the whole file.
pub fn load_rules(path: &Path) -> Result<Vec<Rule>, RuleError> {
    let content = fs::read_to_string(path).map_err(|e| {
        RuleError::configuration(format!(
            "failed to read rules file '{}': {}",
            path.display(),
            e
        ))
    })?;
    parse_rules(&content)
}

pub fn parse_rules(content: &str) -> Result<Vec<Rule>, RuleError> {
    let file: RuleFile = serde_json::from_str(content)
        .map_err(|e| RuleError::configuration(format!("failed to parse rules file: {}", e)))?;

    file.rules
        .into_iter()
        .enumerate()
        .map(|(idx, def)| compile_rule(idx, def))
        .collect()
}

fn compile_rule(idx: usize, def: RuleDef) -> Result<Rule, RuleError> {
    let name = def
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| format!("Rule {}", idx + 1));
    let in_rule = |e: String| RuleError::configuration(format!("rule {} '{}': {}", idx + 1, name, e));

    let aggregation = match def.predicate {
        Some(ref p) => p.parse::<Aggregation>().map_err(in_rule)?,
        None => Aggregation::All,
    };
    let conditions = def
        .conditions
        .into_iter()
        .map(compile_condition)
        .collect::<Result<Vec<_>, _>>()
        .map_err(in_rule)?;
    let actions = def
        .actions
        .into_iter()
        .map(compile_action)
        .collect::<Result<Vec<_>, _>>()
        .map_err(in_rule)?;

    Ok(Rule {
        name,
        aggregation,
        conditions,
        actions,
    })
}

fn compile_condition(def: ConditionDef) -> Result<Condition, String> {
    Ok(Condition {
        field: def.field.parse()?,
        predicate: def.predicate.parse()?,
        value: def.value,
    })
}

fn compile_action(def: ActionDef) -> Result<Action, String> {
    match normalize(&def.action).as_str() {
        "mark as read" | "mark read" => Ok(Action::MarkRead),
        "mark as unread" | "mark unread" => Ok(Action::MarkUnread),
        "move message" | "move" => match def.destination {
            Some(destination) if !destination.trim().is_empty() => Ok(Action::Move {
                destination: destination.trim().to_string(),
            }),
            _ => Err("move action requires a destination".to_string()),
        },
        other => Err(format!("unknown action '{}'", other)),
    }
}

// --- Display ---

pub fn format_rules_for_display(rules: &[Rule]) -> String {
    if rules.is_empty() {
        return "No rules defined.".to_string();
    }

    let mut out = String::new();
    for (idx, rule) in rules.iter().enumerate() {
        out.push_str(&format!("Rule {}: {}\n", idx + 1, rule.name));
        out.push_str(&format!("  Match: {}\n", rule.aggregation));
        if rule.conditions.is_empty() {
            out.push_str("    (no conditions)\n");
        }
        for condition in &rule.conditions {
            out.push_str(&format!("    - {}\n", condition));
        }
        let actions: Vec<String> = rule.actions.iter().map(|a| a.to_string()).collect();
        out.push_str(&format!(
            "  Actions: {}\n",
            if actions.is_empty() {
                "(none)".to_string()
            } else {
                actions.join(", ")
            }
        ));
    }
    out
}
