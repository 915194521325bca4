//! Static catalog of the analysis pipeline stages.
//!
//! Declaration order is the timeline display order. Each entry carries
//! the cumulative progress the server reports once the stage is reached
//! and a rough expected duration, used only for display.
//!
//! Stage resolution prefers a structured key from the server. Matching
//! free-text status lines against [`StageDescriptor::keywords`] is a
//! best-effort fallback kept for servers that only send a message.

/// One named phase of the analysis pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageDescriptor {
    pub key: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    /// Cumulative percentage at which this stage begins.
    pub expected_progress: u8,
    pub expected_duration_secs: u32,
    /// Lower-case fragments that identify this stage inside a
    /// free-text status message.
    pub keywords: &'static [&'static str],
}

pub const STEP_CATALOG: &[StageDescriptor] = &[
    StageDescriptor {
        key: "analysis_start",
        display_name: "Initialization",
        description: "Validating input and preparing the analysis run",
        expected_progress: 10,
        expected_duration_secs: 30,
        keywords: &["iniciando", "initializ", "starting"],
    },
    StageDescriptor {
        key: "data_collection",
        display_name: "Market data collection",
        description: "Searching and scraping market and competitor sources",
        expected_progress: 30,
        expected_duration_secs: 540,
        keywords: &["coletando dados", "data collection", "collecting", "pesquisa"],
    },
    StageDescriptor {
        key: "psychology_analysis",
        display_name: "Avatar psychology",
        description: "Building the psychological profile of the target audience",
        expected_progress: 45,
        expected_duration_secs: 420,
        keywords: &["psicol", "avatar", "psycholog"],
    },
    StageDescriptor {
        key: "analysis_processing",
        display_name: "Analysis processing",
        description: "Cross-referencing collected data with the audience profile",
        expected_progress: 60,
        expected_duration_secs: 420,
        keywords: &["processando", "processing"],
    },
    StageDescriptor {
        key: "mental_drivers",
        display_name: "Mental drivers and objections",
        description: "Identifying persuasion drivers and mapping objections",
        expected_progress: 70,
        expected_duration_secs: 360,
        keywords: &["drivers", "objeç", "objection"],
    },
    StageDescriptor {
        key: "report_generation",
        display_name: "Report generation",
        description: "Compiling the final report and rendering the PDF",
        expected_progress: 80,
        expected_duration_secs: 420,
        keywords: &["gerando relat", "relatório", "report"],
    },
    StageDescriptor {
        key: "quality_assurance",
        display_name: "Quality assurance",
        description: "Scoring report sections and expanding weak ones",
        expected_progress: 95,
        expected_duration_secs: 180,
        keywords: &["qualidade", "quality"],
    },
    StageDescriptor {
        key: "completed",
        display_name: "Completed",
        description: "Analysis finished; report ready for download",
        expected_progress: 100,
        expected_duration_secs: 0,
        keywords: &["concluída", "concluida", "completed", "finished"],
    },
];

/// Look up a stage by its exact key.
pub fn by_key(key: &str) -> Option<&'static StageDescriptor> {
    STEP_CATALOG.iter().find(|s| s.key == key)
}

/// Resolve a stage from a structured key and/or a free-text label.
///
/// Order of precedence: exact key match on `key`, exact key match on
/// `label` (some servers put the key in the label field), then a
/// case-insensitive substring search of `label` against each entry's
/// key, display name and keywords. The first catalog entry that matches
/// wins. `None` means "unknown stage", which is a valid outcome.
pub fn resolve(key: Option<&str>, label: Option<&str>) -> Option<&'static StageDescriptor> {
    if let Some(found) = key.and_then(by_key) {
        return Some(found);
    }
    let label = label?;
    if let Some(found) = by_key(label.trim()) {
        return Some(found);
    }
    match_label(label)
}

fn match_label(label: &str) -> Option<&'static StageDescriptor> {
    let haystack = label.to_lowercase();
    if haystack.trim().is_empty() {
        return None;
    }
    STEP_CATALOG.iter().find(|stage| {
        haystack.contains(&stage.key.replace('_', " "))
            || haystack.contains(&stage.display_name.to_lowercase())
            || stage.keywords.iter().any(|kw| haystack.contains(kw))
    })
}

/// Position of a stage in the timeline, for "step N of M" rendering.
pub fn position(key: &str) -> Option<usize> {
    STEP_CATALOG.iter().position(|s| s.key == key)
}
