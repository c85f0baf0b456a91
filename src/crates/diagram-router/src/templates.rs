//! The closed set of diagram templates the Router may select from, and the
//! richness-to-node-budget mapping the Code Generator appends as a
//! directive.
//!
//! Grounded on `original_source/backend/router.py`'s fixed template
//! enumeration and `original_source/backend/codez_gen.py`'s richness
//! bands.

use serde::{Deserialize, Serialize};

/// One entry per supported Mermaid/Graphviz diagram family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiagramType {
    Flowchart,
    SequenceDiagram,
    ClassDiagram,
    StateDiagram,
    ErDiagram,
    UserJourney,
    Gantt,
    Pie,
    Mindmap,
    Timeline,
    Gitgraph,
    C4Context,
    QuadrantChart,
    XyChart,
    Block,
    Architecture,
    Graphviz,
}

pub const ALL_DIAGRAM_TYPES: &[DiagramType] = &[
    DiagramType::Flowchart,
    DiagramType::SequenceDiagram,
    DiagramType::ClassDiagram,
    DiagramType::StateDiagram,
    DiagramType::ErDiagram,
    DiagramType::UserJourney,
    DiagramType::Gantt,
    DiagramType::Pie,
    DiagramType::Mindmap,
    DiagramType::Timeline,
    DiagramType::Gitgraph,
    DiagramType::C4Context,
    DiagramType::QuadrantChart,
    DiagramType::XyChart,
    DiagramType::Block,
    DiagramType::Architecture,
    DiagramType::Graphviz,
];

impl DiagramType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagramType::Flowchart => "flowchart",
            DiagramType::SequenceDiagram => "sequenceDiagram",
            DiagramType::ClassDiagram => "classDiagram",
            DiagramType::StateDiagram => "stateDiagram",
            DiagramType::ErDiagram => "erDiagram",
            DiagramType::UserJourney => "userJourney",
            DiagramType::Gantt => "gantt",
            DiagramType::Pie => "pie",
            DiagramType::Mindmap => "mindmap",
            DiagramType::Timeline => "timeline",
            DiagramType::Gitgraph => "gitgraph",
            DiagramType::C4Context => "c4context",
            DiagramType::QuadrantChart => "quadrantChart",
            DiagramType::XyChart => "xyChart",
            DiagramType::Block => "block",
            DiagramType::Architecture => "architecture",
            DiagramType::Graphviz => "graphviz",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        ALL_DIAGRAM_TYPES.iter().find(|t| t.as_str().eq_ignore_ascii_case(s)).copied()
    }

    /// A minimal skeleton the Code Generator's prompt anchors on, so the
    /// LLM has a concrete starting shape rather than inventing syntax.
    pub fn skeleton(&self) -> &'static str {
        match self {
            DiagramType::Flowchart => "flowchart TD\n    A[Start] --> B[End]",
            DiagramType::SequenceDiagram => "sequenceDiagram\n    Alice->>Bob: Hello",
            DiagramType::ClassDiagram => "classDiagram\n    class Example",
            DiagramType::StateDiagram => "stateDiagram-v2\n    [*] --> Idle",
            DiagramType::ErDiagram => "erDiagram\n    ENTITY ||--o{ OTHER : relates",
            DiagramType::UserJourney => "journey\n    title Example\n    section Stage\n      Task: 5: User",
            DiagramType::Gantt => "gantt\n    title Example\n    section Stage\n      Task :a1, 2024-01-01, 3d",
            DiagramType::Pie => "pie title Example\n    \"Slice\" : 50",
            DiagramType::Mindmap => "mindmap\n  root((Root))\n    Branch",
            DiagramType::Timeline => "timeline\n    title Example\n    2024 : Event",
            DiagramType::Gitgraph => "gitGraph\n    commit",
            DiagramType::C4Context => "C4Context\n    Person(user, \"User\")",
            DiagramType::QuadrantChart => "quadrantChart\n    title Example\n    x-axis Low --> High\n    y-axis Low --> High",
            DiagramType::XyChart => "xychart-beta\n    title \"Example\"\n    x-axis [a, b]\n    y-axis 0 --> 10",
            DiagramType::Block => "block-beta\n    columns 1\n    A",
            DiagramType::Architecture => "architecture-beta\n    group api(cloud)",
            DiagramType::Graphviz => "digraph G {\n    A -> B;\n}",
        }
    }
}

/// A node-count ceiling derived from the caller's richness dial, per
/// `codez_gen.py`'s summary/standard/full-fidelity bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RichnessBand {
    Summary,
    Standard,
    FullFidelity,
}

impl RichnessBand {
    pub fn from_richness(richness: f32) -> Self {
        if richness <= 0.3 {
            RichnessBand::Summary
        } else if richness <= 0.7 {
            RichnessBand::Standard
        } else {
            RichnessBand::FullFidelity
        }
    }

    pub fn node_budget(&self) -> Option<usize> {
        match self {
            RichnessBand::Summary => Some(10),
            RichnessBand::Standard => Some(20),
            RichnessBand::FullFidelity => None,
        }
    }

    pub fn directive(&self) -> String {
        match self.node_budget() {
            Some(max_nodes) => format!("Keep the diagram to at most {} nodes; summarize, don't enumerate every detail.", max_nodes),
            None => "Render full fidelity: include every entity and relationship found in the blueprint.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(DiagramType::parse("FLOWCHART"), Some(DiagramType::Flowchart));
        assert_eq!(DiagramType::parse("sequenceDiagram"), Some(DiagramType::SequenceDiagram));
        assert_eq!(DiagramType::parse("not-a-type"), None);
    }

    #[test]
    fn test_richness_bands() {
        assert_eq!(RichnessBand::from_richness(0.2).node_budget(), Some(10));
        assert_eq!(RichnessBand::from_richness(0.5).node_budget(), Some(20));
        assert_eq!(RichnessBand::from_richness(0.9).node_budget(), None);
    }
}
