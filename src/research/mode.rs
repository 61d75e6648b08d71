//! 研究模式策略 - 预算查询与自动模式选择

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;

use crate::error::ResearchError;

/// 研究模式，决定轮次与来源预算
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResearchMode {
    Instant,
    Quick,
    Standard,
    Deep,
}

/// 模式对应的固定预算
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeBudget {
    pub max_rounds: u32,
    /// 建议值，会传递给工具选择器，不会截断超出部分
    pub sources_per_round: u32,
    /// 建议值，仅在启用 enforce_wall_clock 时作为截止时间
    #[serde(with = "duration_secs")]
    pub wall_clock_budget: Duration,
}

impl ResearchMode {
    pub const ALL: [ResearchMode; 4] = [
        ResearchMode::Instant,
        ResearchMode::Quick,
        ResearchMode::Standard,
        ResearchMode::Deep,
    ];

    /// 查询模式预算
    pub fn budget(self) -> ModeBudget {
        resolve_budget(self)
    }

    pub fn max_rounds(self) -> u32 {
        self.budget().max_rounds
    }
}

impl std::fmt::Display for ResearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResearchMode::Instant => write!(f, "instant"),
            ResearchMode::Quick => write!(f, "quick"),
            ResearchMode::Standard => write!(f, "standard"),
            ResearchMode::Deep => write!(f, "deep"),
        }
    }
}

impl std::str::FromStr for ResearchMode {
    type Err = ResearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "instant" => Ok(ResearchMode::Instant),
            "quick" => Ok(ResearchMode::Quick),
            "standard" => Ok(ResearchMode::Standard),
            "deep" => Ok(ResearchMode::Deep),
            _ => Err(ResearchError::InvalidMode(s.to_string())),
        }
    }
}

/// 模式预算表
pub fn resolve_budget(mode: ResearchMode) -> ModeBudget {
    let (max_rounds, sources_per_round, secs) = match mode {
        ResearchMode::Instant => (1, 10, 30),
        ResearchMode::Quick => (2, 20, 120),
        ResearchMode::Standard => (5, 50, 300),
        ResearchMode::Deep => (12, 120, 900),
    };
    ModeBudget {
        max_rounds,
        sources_per_round,
        wall_clock_budget: Duration::from_secs(secs),
    }
}

/// 复杂度关键词分层，每层命中任意关键词即计一次分
const KEYWORD_TIERS: &[(u32, &[&str])] = &[
    (
        3,
        &[
            "comprehensive",
            "exhaustive",
            "in-depth",
            "thorough",
            "systematic review",
        ],
    ),
    (
        2,
        &[
            "analysis",
            "analyze",
            "research",
            "investigate",
            "compare",
            "evaluate",
            "implications",
            "trade-off",
        ],
    ),
    (1, &["explain", "summarize", "describe", "overview", "pros and cons"]),
    (0, &["what is", "define", "who is"]),
];

const STRONG_INTERROGATIVES: &[&str] = &["why", "analyze", "evaluate", "compare", "assess"];
const MILD_INTERROGATIVES: &[&str] = &["how", "explain", "describe", "discuss"];

static LEADING_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\p{L}\p{N}]*([\p{L}\p{N}]+)").expect("static regex"));

/// 每层关键词编译为一个按整词匹配的正则
static KEYWORD_PATTERNS: LazyLock<Vec<(u32, Regex)>> = LazyLock::new(|| {
    KEYWORD_TIERS
        .iter()
        .map(|(points, words)| {
            let alternation = words
                .iter()
                .map(|w| regex::escape(w))
                .collect::<Vec<_>>()
                .join("|");
            let pattern = format!(r"\b(?:{})\b", alternation);
            (*points, Regex::new(&pattern).expect("static regex"))
        })
        .collect()
});

static TEAM_MEMBER_HINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)team[\s_-]*member").expect("static regex"));

/// 自动模式选择的评分明细
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModeScore {
    pub keywords: u32,
    pub length: u32,
    pub interrogative: u32,
}

impl ModeScore {
    pub fn total(&self) -> u32 {
        self.keywords + self.length + self.interrogative
    }
}

pub fn score_question(question: &str) -> ModeScore {
    let lowered = question.to_lowercase();

    let keywords = KEYWORD_PATTERNS
        .iter()
        .filter(|(_, pattern)| pattern.is_match(&lowered))
        .map(|(points, _)| points)
        .sum();

    let word_count = lowered.split_whitespace().count();
    let length = match word_count {
        n if n >= 50 => 3,
        n if n >= 25 => 2,
        n if n >= 10 => 1,
        _ => 0,
    };

    let interrogative = LEADING_WORD
        .captures(&lowered)
        .and_then(|c| c.get(1))
        .map(|m| {
            let word = m.as_str();
            if STRONG_INTERROGATIVES.contains(&word) {
                2
            } else if MILD_INTERROGATIVES.contains(&word) {
                1
            } else {
                0
            }
        })
        .unwrap_or(0);

    ModeScore {
        keywords,
        length,
        interrogative,
    }
}

/// 根据问题与可选上下文提示选择研究模式，对任意输入都有确定结果
pub fn select_mode(question: &str, context: Option<&str>) -> ResearchMode {
    let score = score_question(question).total();
    let selected = match score {
        s if s >= 8 => ResearchMode::Deep,
        s if s >= 5 => ResearchMode::Standard,
        s if s >= 2 => ResearchMode::Quick,
        _ => ResearchMode::Instant,
    };

    match context {
        Some(hint) if TEAM_MEMBER_HINT.is_match(hint) => selected.min(ResearchMode::Quick),
        _ => selected,
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_table() {
        let expected = [(1, 10), (2, 20), (5, 50), (12, 120)];
        for (mode, (rounds, sources)) in ResearchMode::ALL.iter().zip(expected) {
            let budget = resolve_budget(*mode);
            assert_eq!(budget.max_rounds, rounds);
            assert_eq!(budget.sources_per_round, sources);
            assert_eq!(budget, resolve_budget(*mode));
        }
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("Deep".parse::<ResearchMode>().unwrap(), ResearchMode::Deep);
        assert_eq!(" quick ".parse::<ResearchMode>().unwrap(), ResearchMode::Quick);
        assert_eq!(
            "turbo".parse::<ResearchMode>(),
            Err(ResearchError::InvalidMode("turbo".to_string()))
        );
    }

    #[test]
    fn test_simple_question_is_instant() {
        assert_eq!(select_mode("What is AI?", None), ResearchMode::Instant);
        assert_eq!(select_mode("", None), ResearchMode::Instant);
        assert_eq!(select_mode("???", None), ResearchMode::Instant);
    }

    #[test]
    fn test_why_question_is_quick() {
        // why(+2)
        assert_eq!(select_mode("Why is the sky blue?", None), ResearchMode::Quick);
    }

    #[test]
    fn test_analysis_questions() {
        let q = "Analyze the research on remote work productivity";
        // analyze(+2) tier2(+2) tier1 none, 7 words
        assert_eq!(score_question(q).total(), 4);
        assert_eq!(select_mode(q, None), ResearchMode::Quick);

        let q = "Why do comprehensive studies of remote work disagree?";
        // why(+2) tier3(+3)
        assert_eq!(select_mode(q, None), ResearchMode::Standard);
    }

    #[test]
    fn test_long_comprehensive_question_is_deep() {
        let q = "Evaluate a comprehensive analysis of battery chemistries for grid storage, \
                 explain the trade-off between cost and cycle life, and summarize where \
                 the research community expects sodium ion to land by the end of the decade";
        let score = score_question(q);
        assert_eq!(score.keywords, 6);
        assert_eq!(score.length, 2);
        assert_eq!(score.interrogative, 2);
        assert_eq!(select_mode(q, None), ResearchMode::Deep);
    }

    #[test]
    fn test_keywords_match_whole_words_only() {
        assert_eq!(score_question("Is this value undefined").keywords, 0);
        assert_eq!(score_question("Which researcher left the lab").keywords, 0);
        assert_eq!(score_question("List unexplained outages").keywords, 0);
        assert_eq!(score_question("Please research and explain this").keywords, 3);
        assert_eq!(score_question("An in-depth look at pros and cons").keywords, 4);
    }

    #[test]
    fn test_team_member_context_caps_at_quick() {
        let q = "Evaluate a comprehensive analysis of battery chemistries for grid storage, \
                 explain the trade-off between cost and cycle life";
        assert_eq!(select_mode(q, None), ResearchMode::Deep);
        assert_eq!(select_mode(q, Some("Team Member")), ResearchMode::Quick);
        assert_eq!(select_mode(q, Some("role=team_member")), ResearchMode::Quick);
        assert_eq!(select_mode("What is AI?", Some("team member")), ResearchMode::Instant);
    }
}
