use anyhow::Result;
use serde_json::{Value, json};

use crate::commands::emit_json;
use crate::registry::Registry;

pub fn run() -> Result<()> {
    emit_json(&catalog(&Registry::builtin()), None)
}

fn catalog(registry: &Registry) -> Value {
    json!({
        "reports": registry.reports().collect::<Vec<_>>(),
        "analyses": registry
            .analyses()
            .map(|analysis| json!({ "slug": analysis.slug(), "name": analysis.name() }))
            .collect::<Vec<Value>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::catalog;
    use crate::registry::Registry;

    #[test]
    fn catalog_lists_reports_with_their_analyses() {
        let catalog = catalog(&Registry::builtin());
        let reports = catalog["reports"]
            .as_array()
            .expect("reports should be an array");
        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0]["slug"], "retrieval_performance");
        assert_eq!(reports[1]["analyses"][1], "precision_recall_curve");
        assert_eq!(
            catalog["analyses"]
                .as_array()
                .expect("analyses should be an array")
                .len(),
            9
        );
    }
}
