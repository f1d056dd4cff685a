// src/classify.rs

//! Category classification by ordered phrase rules.
//!
//! Rules are evaluated top to bottom against `title + " " + description`;
//! the first rule with any matching phrase decides the category, no match
//! gives [`Category::Unclassified`]. Phrases match case-insensitively on
//! word boundaries, so `VA` does not fire inside `Java` or `available`.
//!
//! The table can be replaced from TOML:
//!
//! ```toml
//! [[rules]]
//! category = "healthcare"
//! phrases = ["nurse", "caregiver"]
//! ```

use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::model::Category;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CategoryRule {
    pub category: Category,
    pub phrases: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RuleTable {
    pub rules: Vec<CategoryRule>,
}

impl RuleTable {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading category rules from {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Built-in table for the Philippine job market.
    pub fn builtin() -> Self {
        let table: &[(Category, &[&str])] = &[
            (
                Category::CallCenter,
                &[
                    "call center", "callcenter", "customer service", "customer support",
                    "BPO", "CSR", "contact center", "helpdesk", "help desk", "inbound",
                    "outbound", "collections agent", "telemarketer", "technical support",
                    "tier 1", "tier 2", "voice agent", "non-voice", "chat support",
                    "email support",
                ],
            ),
            (
                Category::VirtualAssistant,
                &[
                    "virtual assistant", "VA", "admin assistant", "administrative assistant",
                    "data entry", "online assistant", "remote assistant", "executive assistant",
                    "social media manager", "content moderator", "online tutor", "bookkeeper",
                    "transcriptionist", "research assistant", "project coordinator",
                    "operations assistant",
                ],
            ),
            (
                Category::Pogo,
                &[
                    "POGO", "online gaming", "gaming operator", "casino dealer", "live dealer",
                    "casino staff", "igaming", "i-gaming", "online casino", "gaming company",
                    "esports", "game master", "casino host", "poker dealer",
                ],
            ),
            (
                Category::Remote,
                &[
                    "work from home", "WFH", "remote work", "remote job", "telecommute",
                    "home based", "homebased", "online job", "freelance", "flexible work",
                    "hybrid work", "remote first",
                ],
            ),
            (
                Category::Accounting,
                &[
                    "accountant", "accounting", "bookkeeping", "auditor", "finance officer",
                    "payroll", "CPA", "accounts payable", "accounts receivable",
                    "financial analyst", "treasury",
                ],
            ),
            (
                Category::ItTech,
                &[
                    "software developer", "web developer", "programmer", "IT support",
                    "network engineer", "system administrator", "devops", "QA engineer",
                    "data analyst", "data scientist", "UI UX", "frontend", "backend",
                    "full stack", "mobile developer", "cybersecurity",
                ],
            ),
            (
                Category::SalesMarketing,
                &[
                    "sales representative", "sales agent", "marketing officer",
                    "digital marketing", "SEO specialist", "content writer", "copywriter",
                    "graphic designer", "social media", "brand ambassador", "account manager",
                    "business development",
                ],
            ),
            (
                Category::Healthcare,
                &[
                    "nurse", "nursing", "caregiver", "medical", "healthcare", "pharmacist",
                    "physical therapist", "radiologist", "midwife", "dental", "optometrist",
                    "medical coder",
                ],
            ),
        ];

        Self {
            rules: table
                .iter()
                .map(|(category, phrases)| CategoryRule {
                    category: *category,
                    phrases: phrases.iter().map(|p| p.to_string()).collect(),
                })
                .collect(),
        }
    }
}

/// Compiled form of a [`RuleTable`].
#[derive(Debug, Clone)]
pub struct Classifier {
    compiled: Vec<(Category, Regex)>,
}

impl Classifier {
    pub fn new(table: &RuleTable) -> Result<Self> {
        let mut compiled = Vec::with_capacity(table.rules.len());
        for rule in &table.rules {
            let alternatives: Vec<String> = rule
                .phrases
                .iter()
                .map(|p| p.trim())
                .filter(|p| !p.is_empty())
                .map(|p| regex::escape(p).replace(' ', r"\s+"))
                .collect();
            if alternatives.is_empty() {
                continue;
            }
            let pattern = format!(r"\b(?:{})\b", alternatives.join("|"));
            let re = RegexBuilder::new(&pattern)
                .case_insensitive(true)
                .build()
                .with_context(|| format!("compiling rule for {}", rule.category))?;
            compiled.push((rule.category, re));
        }
        Ok(Self { compiled })
    }

    pub fn builtin() -> Self {
        Self::new(&RuleTable::builtin()).expect("built-in category rules compile")
    }

    /// Builtin table unless `path` is given; a broken file is an error.
    pub fn from_optional_path(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::new(&RuleTable::load_from_file(p)?),
            None => Ok(Self::builtin()),
        }
    }

    pub fn classify(&self, title: &str, description: &str) -> Category {
        let text = format!("{title} {description}");
        self.compiled
            .iter()
            .find(|(_, re)| re.is_match(&text))
            .map(|(c, _)| *c)
            .unwrap_or(Category::Unclassified)
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::builtin()
    }
}
