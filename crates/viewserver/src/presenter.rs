use serde_json::Value;
use viewserver_common::Colors;
use viewserver_core::NodeId;
use viewserver_core::ProfileRating;
use viewserver_core::ViewTree;
use crate::commands::OutputFormat;
use crate::error::ErrorReport;

/// Output formatting shared by every handler, so the same handler serves
/// text and JSON output.
pub trait Presenter {
    /// Present a success result with optional warning.
    fn present_success(&self, message: &str, warning: Option<&str>);

    fn present_error(&self, message: &str);

    /// Present a structured value (for JSON output, shows the raw value).
    fn present_value(&self, value: &Value);

    /// Present a failed command with its suggestion.
    fn present_error_report(&self, report: &ErrorReport);

    fn present_list_header(&self, title: &str);

    fn present_list_item(&self, item: &str);

    /// Present a dim/info message.
    fn present_info(&self, message: &str);

    fn present_raw(&self, text: &str);
}

/// Text presenter for human-readable output.
pub struct TextPresenter;

impl Presenter for TextPresenter {
    fn present_success(&self, message: &str, warning: Option<&str>) {
        println!("{} {}", Colors::success("✓"), message);
        if let Some(w) = warning {
            eprintln!("{} {}", Colors::dim("Warning:"), w);
        }
    }

    fn present_error(&self, message: &str) {
        eprintln!("{} {}", Colors::error("Error:"), message);
    }

    fn present_value(&self, value: &Value) {
        if let Some(s) = value.as_str() {
            println!("{}", s);
        } else {
            println!(
                "{}",
                serde_json::to_string_pretty(value).unwrap_or_default()
            );
        }
    }

    fn present_error_report(&self, report: &ErrorReport) {
        eprintln!("{} {}", Colors::error("Error:"), report.message);
        if let Some(suggestion) = &report.suggestion {
            eprintln!("{} {}", Colors::dim("Suggestion:"), suggestion);
        }
        if report.retryable {
            eprintln!(
                "{}",
                Colors::dim("(This error may be transient - retry may succeed)")
            );
        }
    }

    fn present_list_header(&self, title: &str) {
        println!("{}", Colors::bold(title));
    }

    fn present_list_item(&self, item: &str) {
        println!("  {}", item);
    }

    fn present_info(&self, message: &str) {
        println!("{}", Colors::dim(message));
    }

    fn present_raw(&self, text: &str) {
        println!("{}", text);
    }
}

/// JSON presenter for machine-readable output.
pub struct JsonPresenter;

fn print_json(value: &Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_default()
    );
}

impl Presenter for JsonPresenter {
    fn present_success(&self, message: &str, warning: Option<&str>) {
        let mut output = serde_json::json!({
            "success": true,
            "message": message
        });
        if let Some(w) = warning {
            output["warning"] = serde_json::json!(w);
        }
        print_json(&output);
    }

    fn present_error(&self, message: &str) {
        let output = serde_json::json!({
            "success": false,
            "error": message
        });
        eprintln!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
    }

    fn present_value(&self, value: &Value) {
        print_json(value);
    }

    fn present_error_report(&self, report: &ErrorReport) {
        eprintln!(
            "{}",
            serde_json::to_string_pretty(&error_report_json(report)).unwrap_or_default()
        );
    }

    fn present_list_header(&self, _title: &str) {
        // The structure conveys the meaning
    }

    fn present_list_item(&self, item: &str) {
        println!("{}", Value::String(item.to_string()));
    }

    fn present_info(&self, message: &str) {
        print_json(&serde_json::json!({ "info": message }));
    }

    fn present_raw(&self, text: &str) {
        print_json(&serde_json::json!({ "output": text }));
    }
}

fn error_report_json(report: &ErrorReport) -> Value {
    serde_json::json!({
        "success": false,
        "error": report.message,
        "category": report.category.as_str(),
        "retryable": report.retryable,
        "suggestion": report.suggestion,
    })
}

pub fn create_presenter(format: OutputFormat) -> Box<dyn Presenter> {
    match format {
        OutputFormat::Json => Box::new(JsonPresenter),
        OutputFormat::Text => Box::new(TextPresenter),
    }
}

fn rated(millis: f64, rating: ProfileRating) -> String {
    let text = format!("{:.3}", millis);
    match rating {
        ProfileRating::Red => Colors::error(&text),
        ProfileRating::Yellow => Colors::warning(&text),
        ProfileRating::Green => Colors::success(&text),
        ProfileRating::None => text,
    }
}

/// One line per node in dump order, indented two spaces per level.
///
/// Filtered nodes are highlighted; timings are appended when `with_timings`
/// is set and the node was profiled.
pub fn render_tree(tree: &ViewTree, with_timings: bool) -> Vec<String> {
    tree.preorder(tree.root())
        .into_iter()
        .map(|id| render_node(tree, id, with_timings))
        .collect()
}

fn render_node(tree: &ViewTree, id: NodeId, with_timings: bool) -> String {
    let node = tree.node(id);
    let identity = node.to_string();
    let identity = if node.filtered {
        Colors::warning(&identity)
    } else {
        Colors::window_id(&identity)
    };

    let mut line = format!("{}{}", "  ".repeat(node.depth), identity);
    if node.id != viewserver_core::NO_ID {
        line.push(' ');
        line.push_str(&node.id);
    }
    line.push_str(&Colors::dim(&format!(
        " [{},{} {}x{}] ({})",
        node.left, node.top, node.width, node.height, node.view_count
    )));
    if node.has_focus {
        line.push_str(&Colors::info(" focused"));
    }
    if with_timings && node.is_profiled() {
        line.push_str(&format!(
            " measure={} layout={} draw={}",
            rated(node.measure_time, node.measure_rating),
            rated(node.layout_time, node.layout_rating),
            rated(node.draw_time, node.draw_rating),
        ));
    }
    line
}
