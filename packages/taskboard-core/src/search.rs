//! Task filtering and per-board statistics.
//!
//! Filters can be built field by field or compiled from a query string:
//!
//! ```text
//! login "error page" #bug @ana priority:high due:overdue is:archived /fix(ed)?/
//! ```
//!
//! Text comparisons fold case and accents, so `resume` matches `Résumé`.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::types::{Board, Priority, Task, STATUS_DONE};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DueFilter {
    /// No constraint on the due date.
    #[default]
    Any,
    Overdue,
    Today,
    /// Due within the current Monday-to-Sunday week.
    Week,
    Future,
    NoDueDate,
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Every term must appear in the title, description or tags.
    pub text: Vec<String>,
    /// Any of these priorities; empty matches all.
    pub priorities: Vec<Priority>,
    /// Any of these assignees; empty matches all.
    pub assignees: Vec<String>,
    /// All of these tags; empty matches all.
    pub tags: Vec<String>,
    pub due: DueFilter,
    pub include_archived: bool,
    /// Matched against title and description.
    pub pattern: Option<Regex>,
}

impl TaskFilter {
    /// Build a filter from a query string. Unknown `key:value` tokens and
    /// invalid patterns are treated as plain text.
    pub fn parse(query: &str) -> Self {
        let mut filter = Self::default();
        for token in split_query_tokens(query.trim()) {
            filter.push_token(&token);
        }
        filter
    }

    fn push_token(&mut self, token: &str) {
        if let Some(tag) = token.strip_prefix('#').filter(|t| !t.is_empty()) {
            self.tags.push(tag.to_string());
            return;
        }
        if let Some(name) = token.strip_prefix('@').filter(|n| !n.is_empty()) {
            self.assignees.push(name.to_string());
            return;
        }
        if token.len() > 2 && token.starts_with('/') && token.ends_with('/') {
            if let Ok(regex) = Regex::new(&token[1..token.len() - 1]) {
                self.pattern = Some(regex);
                return;
            }
        }

        if let Some((key, value)) = token.split_once(':').filter(|(_, v)| !v.is_empty()) {
            let handled = match key.to_ascii_lowercase().as_str() {
                "tag" => {
                    self.tags.push(value.to_string());
                    true
                }
                "assignee" | "who" => {
                    self.assignees.push(value.to_string());
                    true
                }
                "priority" | "p" => match parse_priority(value) {
                    Some(priority) => {
                        self.priorities.push(priority);
                        true
                    }
                    None => false,
                },
                "due" => match parse_due(value) {
                    Some(due) => {
                        self.due = due;
                        true
                    }
                    None => false,
                },
                "is" if value.eq_ignore_ascii_case("archived") => {
                    self.include_archived = true;
                    true
                }
                "re" | "regex" => match Regex::new(value) {
                    Ok(regex) => {
                        self.pattern = Some(regex);
                        true
                    }
                    Err(_) => false,
                },
                _ => false,
            };
            if handled {
                return;
            }
        }

        self.text.push(token.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
            && self.priorities.is_empty()
            && self.assignees.is_empty()
            && self.tags.is_empty()
            && self.due == DueFilter::Any
            && self.pattern.is_none()
    }

    pub fn matches(&self, task: &Task, now: DateTime<Utc>) -> bool {
        if task.is_archived() && !self.include_archived {
            return false;
        }
        if !self.priorities.is_empty() && !self.priorities.contains(&task.priority) {
            return false;
        }
        if !self.assignees.is_empty() {
            let assigned = task.assignee_list();
            let hit = self
                .assignees
                .iter()
                .any(|wanted| assigned.iter().any(|a| equals_text(a, wanted)));
            if !hit {
                return false;
            }
        }
        if !self
            .tags
            .iter()
            .all(|wanted| task.tags.iter().any(|t| equals_text(t, wanted)))
        {
            return false;
        }
        if !self.text.is_empty() {
            let haystack = normalize_for_search(&format!(
                "{}\n{}\n{}",
                task.title,
                task.description,
                task.tags.join(" ")
            ));
            if !self
                .text
                .iter()
                .all(|term| haystack.contains(&normalize_for_search(term)))
            {
                return false;
            }
        }
        if let Some(regex) = &self.pattern {
            if !regex.is_match(&task.title) && !regex.is_match(&task.description) {
                return false;
            }
        }
        matches_due(self.due, task, now.date_naive())
    }
}

/// Tasks of `board` matching `filter`, in board order.
pub fn filter_tasks<'a>(board: &'a Board, filter: &TaskFilter, now: DateTime<Utc>) -> Vec<&'a Task> {
    board
        .all_tasks()
        .filter(|task| filter.matches(task, now))
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoardStats {
    /// Tasks not archived.
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub archived: usize,
    pub overdue: usize,
    pub subtasks_total: usize,
    pub subtasks_completed: usize,
    pub estimated_hours: f64,
}

impl BoardStats {
    pub fn subtask_ratio(&self) -> Option<f64> {
        if self.subtasks_total == 0 {
            None
        } else {
            Some(self.subtasks_completed as f64 / self.subtasks_total as f64)
        }
    }
}

pub fn board_stats(board: &Board, now: DateTime<Utc>) -> BoardStats {
    let today = now.date_naive();
    let mut stats = BoardStats::default();
    for task in board.all_tasks() {
        if task.is_archived() {
            stats.archived += 1;
            continue;
        }
        stats.total += 1;
        *stats.by_status.entry(task.status.clone()).or_default() += 1;
        if is_overdue(task, today) {
            stats.overdue += 1;
        }
        stats.subtasks_total += task.subtasks.len();
        stats.subtasks_completed += task.subtasks.iter().filter(|s| s.completed).count();
        stats.estimated_hours += task.estimated_hours.unwrap_or(0.0);
    }
    stats
}

fn due_day(task: &Task) -> Option<NaiveDate> {
    task.due_date
        .as_ref()
        .and_then(|d| d.as_datetime())
        .map(|d| d.date_naive())
}

fn is_overdue(task: &Task, today: NaiveDate) -> bool {
    task.status != STATUS_DONE && due_day(task).is_some_and(|d| d < today)
}

fn matches_due(mode: DueFilter, task: &Task, today: NaiveDate) -> bool {
    let due = due_day(task);
    match mode {
        DueFilter::Any => true,
        DueFilter::Overdue => is_overdue(task, today),
        DueFilter::Today => due == Some(today),
        DueFilter::Week => {
            let week_start = today - Duration::days(today.weekday().num_days_from_monday() as i64);
            let week_end = week_start + Duration::days(6);
            due.is_some_and(|d| d >= week_start && d <= week_end)
        }
        DueFilter::Future => due.is_some_and(|d| d > today),
        DueFilter::NoDueDate => due.is_none(),
    }
}

fn parse_priority(value: &str) -> Option<Priority> {
    match value.to_ascii_lowercase().as_str() {
        "lowest" => Some(Priority::Lowest),
        "low" => Some(Priority::Low),
        "medium" => Some(Priority::Medium),
        "high" => Some(Priority::High),
        "urgent" => Some(Priority::Urgent),
        _ => None,
    }
}

fn parse_due(value: &str) -> Option<DueFilter> {
    match value.to_ascii_lowercase().as_str() {
        "any" => Some(DueFilter::Any),
        "overdue" => Some(DueFilter::Overdue),
        "today" => Some(DueFilter::Today),
        "week" | "thisweek" => Some(DueFilter::Week),
        "future" | "upcoming" => Some(DueFilter::Future),
        "none" => Some(DueFilter::NoDueDate),
        _ => None,
    }
}

/// Whitespace-separated tokens; double quotes group a phrase, backslash
/// escapes the next character.
fn split_query_tokens(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for ch in input.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' => {
                in_quotes = !in_quotes;
                if !in_quotes && !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Lowercase, decompose and drop combining marks, then recompose.
fn normalize_for_search(value: &str) -> String {
    value
        .to_lowercase()
        .nfd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .nfc()
        .collect()
}

fn equals_text(left: &str, right: &str) -> bool {
    strip_sigil(&normalize_for_search(left)) == strip_sigil(&normalize_for_search(right))
}

fn strip_sigil(value: &str) -> &str {
    value.trim_start_matches(['#', '@'])
}
