use serde::Serialize;

/// Output of a command, printable either for a human or as JSON.
pub trait Report: Serialize {
    /// Human-readable text, as the operator sees it in the terminal.
    fn render(&self) -> String;

    fn to_json(&self) -> String {
        serde_json::to_string_pretty(self)
            .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize report: {}\"}}", e))
    }

    /// Whether the report describes a healthy state. Drives the exit code of
    /// checks that act as assertions.
    fn is_ok(&self) -> bool {
        true
    }
}

pub fn print<R: Report>(report: &R, json: bool) {
    if json {
        println!("{}", report.to_json());
    } else {
        println!("{}", report.render());
    }
}
