use serde::Serialize;

/// An ordered selection of analyses run against one task and run selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Report {
    pub slug: &'static str,
    pub name: &'static str,
    /// Analysis slugs in execution order.
    pub analyses: &'static [&'static str],
}

pub const RETRIEVAL_PERFORMANCE: Report = Report {
    slug: "retrieval_performance",
    name: "Retrieval Performance Evaluation",
    analyses: &[
        "overall_retrieval_characteristics",
        "experimental_evaluation",
        "positional_distribution",
        "precision_recall_curve",
        "retrieved_document_intersection",
        "documents_retrieved_by_all_systems",
    ],
};

pub const QUERY_BASED_ANALYSIS: Report = Report {
    slug: "query_based_analysis",
    name: "Query-based Analysis",
    analyses: &["overall_retrieval_characteristics", "precision_recall_curve"],
};

pub const QUERY_COLLECTION_BASED_PERFORMANCE: Report = Report {
    slug: "query_collection_based_performance",
    name: "Query Collection Based Performance Report",
    analyses: &[
        "relevance_judgments_per_query",
        "relevance_judgments_for_multiple_queries",
        "documents_retrieved_by_all_systems",
        "relevance_ranking_positions",
    ],
};

pub const BUILTIN_REPORTS: [Report; 3] = [
    RETRIEVAL_PERFORMANCE,
    QUERY_BASED_ANALYSIS,
    QUERY_COLLECTION_BASED_PERFORMANCE,
];
