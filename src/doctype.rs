//! URL classification for placeholder cards and the acquisition fast path.
//!
//! Both tables are ordered; the first matching rule wins.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocCategory {
    CodeRepository,
    Documentation,
    Collaboration,
    Blog,
    Article,
    Webpage,
}

impl DocCategory {
    pub fn label(&self) -> &'static str {
        match self {
            DocCategory::CodeRepository => "code repository",
            DocCategory::Documentation => "documentation",
            DocCategory::Collaboration => "collaboration",
            DocCategory::Blog => "blog",
            DocCategory::Article => "article",
            DocCategory::Webpage => "webpage",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DocType {
    pub category: DocCategory,
    pub icon: &'static str,
    pub color: &'static str,
    pub background_color: &'static str,
}

struct ClassifierRule {
    keywords: &'static [&'static str],
    doc_type: DocType,
}

static CLASSIFIER_RULES: &[ClassifierRule] = &[
    ClassifierRule {
        keywords: &["github.com", "gitlab.com", "bitbucket.org", "gitee.com"],
        doc_type: DocType {
            category: DocCategory::CodeRepository,
            icon: "💻",
            color: "#0366d6",
            background_color: "#f6f8fa",
        },
    },
    ClassifierRule {
        keywords: &["readthedocs.io", "docs.", "documentation", "wiki"],
        doc_type: DocType {
            category: DocCategory::Documentation,
            icon: "📚",
            color: "#28a745",
            background_color: "#f0f9f4",
        },
    },
    ClassifierRule {
        keywords: &["notion.so", "notion.site", "feishu", "lark", "confluence"],
        doc_type: DocType {
            category: DocCategory::Collaboration,
            icon: "🤝",
            color: "#4ecdc4",
            background_color: "#f0fdfa",
        },
    },
    ClassifierRule {
        keywords: &["docs.google.com", "workspace.google.com"],
        doc_type: DocType {
            category: DocCategory::Documentation,
            icon: "📝",
            color: "#4285f4",
            background_color: "#e8f0fe",
        },
    },
    ClassifierRule {
        keywords: &["zhihu.com", "juejin.cn", "csdn.net", "blog", "medium.com"],
        doc_type: DocType {
            category: DocCategory::Blog,
            icon: "📝",
            color: "#ff6b6b",
            background_color: "#fff5f5",
        },
    },
    ClassifierRule {
        keywords: &["mp.weixin.qq.com"],
        doc_type: DocType {
            category: DocCategory::Article,
            icon: "📰",
            color: "#07c160",
            background_color: "#f0fdf4",
        },
    },
    ClassifierRule {
        keywords: &["docs.xiaohongshu.com", "xiaohongshu.com/doc"],
        doc_type: DocType {
            category: DocCategory::Documentation,
            icon: "📚",
            color: "#ff2442",
            background_color: "#fff5f5",
        },
    },
];

const DEFAULT_DOC_TYPE: DocType = DocType {
    category: DocCategory::Webpage,
    icon: "📄",
    color: "#95a5a6",
    background_color: "#f8f9fa",
};

/// Pages where a rendered screenshot or card beats scraped OpenGraph data.
static DOC_LIKE_KEYWORDS: &[&str] = &[
    // code hosting and developer docs
    "github.com",
    "gitlab.com",
    "readthedocs.io",
    "stackoverflow.com",
    "stackexchange.com",
    "/docs/",
    "developer.",
    "dev.",
    "documentation",
    "wiki",
    // collaboration tools
    "notion.so",
    "notion.site",
    "feishu.cn",
    "feishuapp.com",
    "larkoffice.com",
    "docs.google.com",
    "docs.googleusercontent.com",
    "confluence",
    "jira",
    "atlassian.net",
    // regional platforms
    "docs.xiaohongshu.com",
    "xiaohongshu.com/doc/",
    "mp.weixin.qq.com",
    "zhihu.com",
    "juejin.cn",
    "segmentfault.com",
    "csdn.net",
    // article hosts
    "medium.com",
    "dev.to",
    "hashnode.com",
    "reddit.com/r/",
];

/// Classify a page by its URL and optional site name.
pub fn classify(url: &str, site_name: &str) -> DocType {
    let url_lower = url.to_lowercase();
    let site_lower = site_name.to_lowercase();

    CLASSIFIER_RULES
        .iter()
        .find(|rule| {
            rule.keywords.iter().any(|kw| {
                url_lower.contains(kw) || (!site_lower.is_empty() && site_lower.contains(kw))
            })
        })
        .map(|rule| rule.doc_type)
        .unwrap_or(DEFAULT_DOC_TYPE)
}

pub fn is_doc_like(url: &str) -> bool {
    let url_lower = url.to_lowercase();
    DOC_LIKE_KEYWORDS.iter().any(|kw| url_lower.contains(kw))
}
