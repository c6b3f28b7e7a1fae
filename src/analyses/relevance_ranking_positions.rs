use serde_json::{Value, json};

use super::common::{blend, judged_qrels, require_runs};
use super::{Analysis, AnalysisContext, FieldSpec, ParameterSchema, Parameters};
use crate::error::EvalError;
use crate::model::{RetrievalRun, RetrievalTask};
use crate::results::{AnalysisOutput, Plot, heatmap_trace};
use crate::util::sort_query_ids;

const RANKING_DEPTH: &str = "ranking_depth";
const GRID_COLUMNS: usize = 2;
const HORIZONTAL_SPACING: f64 = 0.05;
/// Out-of-band heatmap value for retrieved documents without a judgment.
pub(crate) const UNJUDGED_VALUE: i64 = -100;

/// Heatmap of relevance grade by rank position and query, one panel per run.
pub struct RelevanceRankingPositions;

impl Analysis for RelevanceRankingPositions {
    fn slug(&self) -> &'static str {
        "relevance_ranking_positions"
    }

    fn name(&self) -> &'static str {
        "Retrieved Documents, Relevance, Ranking Position"
    }

    fn schema(
        &self,
        _ctx: &AnalysisContext<'_>,
        _task: &RetrievalTask,
        _runs: &[RetrievalRun],
    ) -> Result<ParameterSchema, EvalError> {
        Ok(ParameterSchema::new().field(
            FieldSpec::integer(RANKING_DEPTH, "Ranking depth", Some(1), Some(100)).with_initial(25),
        ))
    }

    fn execute(
        &self,
        ctx: &AnalysisContext<'_>,
        task: &RetrievalTask,
        runs: &[RetrievalRun],
        parameters: &Parameters,
    ) -> Result<AnalysisOutput, EvalError> {
        require_runs(runs)?;
        let qrels = judged_qrels(ctx, task)?;
        let depth = u32::try_from(parameters.integer(RANKING_DEPTH)?)
            .map_err(|_| EvalError::invalid(RANKING_DEPTH, "value out of range"))?;

        let grades = qrels.relevance_grades();
        let max_grade = grades.last().copied().map_or(0, i64::from);
        let colors = color_scale(grades.len());
        let values = std::iter::once(UNJUDGED_VALUE)
            .chain(grades.iter().map(|grade| i64::from(*grade)))
            .collect::<Vec<i64>>();
        let span = ((max_grade - UNJUDGED_VALUE) as f64).max(1.0);
        let colorscale = values
            .iter()
            .zip(&colors)
            .map(|(value, color)| json!([(value - UNJUDGED_VALUE) as f64 / span, color]))
            .collect::<Vec<Value>>();

        let grid_rows = runs.len().div_ceil(GRID_COLUMNS);
        let mut plot = Plot::default();
        let mut annotations = Vec::with_capacity(runs.len());

        for (position, run) in runs.iter().enumerate() {
            let table = ctx.loader.run(run)?;
            let mut query_ids = table.query_ids().collect::<Vec<&str>>();
            sort_query_ids(&mut query_ids);

            let mut z = Vec::with_capacity(depth as usize);
            let mut hover = Vec::with_capacity(depth as usize);
            for rank in 1..=depth {
                let mut z_row = Vec::with_capacity(query_ids.len());
                let mut hover_row = Vec::with_capacity(query_ids.len());
                for query_id in &query_ids {
                    let document = table
                        .ranking(query_id)
                        .iter()
                        .find(|document| document.rank == rank);
                    match document {
                        Some(document) => {
                            let grade = qrels.relevance(query_id, &document.doc_id);
                            let shown = grade.map_or("Unjudged".to_string(), |grade| grade.to_string());
                            z_row.push(Value::from(grade.map_or(UNJUDGED_VALUE, i64::from)));
                            hover_row.push(Value::from(format!(
                                "Query: {query_id}<br>Rank: {rank}<br>Doc ID: {}<br>Relevance: {shown}",
                                document.doc_id
                            )));
                        }
                        None => {
                            z_row.push(Value::Null);
                            hover_row.push(Value::Null);
                        }
                    }
                }
                z.push(z_row);
                hover.push(hover_row);
            }

            let axis = axis_suffix(position);
            let mut trace = heatmap_trace(
                &run.title,
                query_ids.iter().map(|query_id| Value::from(*query_id)).collect(),
                (1..=depth).map(Value::from).collect(),
                z,
            );
            trace["colorscale"] = Value::Array(colorscale.clone());
            trace["showscale"] = json!(false);
            trace["hoverinfo"] = json!("text");
            trace["text"] = json!(hover);
            trace["xgap"] = json!(1);
            trace["ygap"] = json!(1);
            trace["zmin"] = json!(UNJUDGED_VALUE);
            trace["zmax"] = json!(max_grade);
            trace["xaxis"] = json!(format!("x{axis}"));
            trace["yaxis"] = json!(format!("y{axis}"));
            plot.push_trace(trace);

            let (x_domain, y_domain) = domains(position, grid_rows);
            let y_title = if position % GRID_COLUMNS == 0 {
                "Ranking Position"
            } else {
                ""
            };
            plot.set_layout(
                &format!("xaxis{axis}"),
                json!({
                    "domain": x_domain,
                    "anchor": format!("y{axis}"),
                    "title": { "text": "Query ID" },
                    "tickangle": 45,
                }),
            );
            plot.set_layout(
                &format!("yaxis{axis}"),
                json!({
                    "domain": y_domain,
                    "anchor": format!("x{axis}"),
                    "title": { "text": y_title },
                }),
            );
            annotations.push(json!({
                "text": run.title,
                "showarrow": false,
                "xref": "paper",
                "yref": "paper",
                "x": (x_domain[0] + x_domain[1]) / 2.0,
                "y": y_domain[1],
                "xanchor": "center",
                "yanchor": "bottom",
            }));
        }

        for (value, color) in values.iter().zip(&colors) {
            let label = if *value == UNJUDGED_VALUE {
                "Unjudged Relevance".to_string()
            } else {
                format!("Relevance_Label_{value}")
            };
            plot.push_trace(json!({
                "type": "scatter",
                "x": [Value::Null],
                "y": [Value::Null],
                "mode": "markers",
                "marker": { "size": 10, "color": color },
                "name": label,
                "legendgroup": format!("relevance {value}"),
                "showlegend": true,
            }));
        }

        plot.set_layout("annotations", Value::Array(annotations));
        plot.set_layout("height", json!(700 * grid_rows));
        plot.set_layout("width", json!(1400));
        plot.set_layout(
            "title",
            json!({ "text": format!(
                "Document Ranking and Relevance for the Top {depth} Rank Positions per Experiment"
            ) }),
        );
        plot.set_layout("font", json!({ "size": 14 }));
        plot.set_layout(
            "legend",
            json!({ "orientation": "h", "yanchor": "bottom", "y": 1.02, "xanchor": "right", "x": 1 }),
        );

        Ok(AnalysisOutput::Plot(plot))
    }
}

/// Light gray for unjudged, then red through orange to green by grade.
fn color_scale(grade_count: usize) -> Vec<String> {
    let mut colors = vec!["#d3d3d3".to_string()];
    if grade_count <= 1 {
        colors.push("#ff0000".to_string());
        return colors;
    }

    let red = (255, 0, 0);
    let orange = (255, 165, 0);
    let green = (0, 128, 0);
    for index in 0..grade_count {
        let t = index as f64 / (grade_count - 1) as f64;
        colors.push(if t <= 0.5 {
            blend(red, orange, t * 2.0)
        } else {
            blend(orange, green, (t - 0.5) * 2.0)
        });
    }
    colors
}

fn axis_suffix(position: usize) -> String {
    if position == 0 {
        String::new()
    } else {
        (position + 1).to_string()
    }
}

fn domains(position: usize, grid_rows: usize) -> ([f64; 2], [f64; 2]) {
    let column = position % GRID_COLUMNS;
    let row = position / GRID_COLUMNS;

    let width = (1.0 - HORIZONTAL_SPACING * (GRID_COLUMNS - 1) as f64) / GRID_COLUMNS as f64;
    let x_start = column as f64 * (width + HORIZONTAL_SPACING);

    let vertical_spacing = if grid_rows > 1 { 0.3 / grid_rows as f64 } else { 0.0 };
    let height = (1.0 - vertical_spacing * (grid_rows - 1) as f64) / grid_rows as f64;
    let y_end = 1.0 - row as f64 * (height + vertical_spacing);

    ([x_start, x_start + width], [y_end - height, y_end])
}
