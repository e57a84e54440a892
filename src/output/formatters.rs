use crate::devices::TwistReading;

pub trait DataFormatter: Send + Sync {
    fn format_reading(&self, topic: &str, reading: &TwistReading) -> String;
    fn format_header(&self) -> String;
    fn name(&self) -> &str;
}

/// Picks a formatter by its configured name, falling back to console.
pub fn formatter_for(name: &str) -> Box<dyn DataFormatter> {
    match name {
        "json" => Box::new(JsonFormatter),
        "csv" => Box::new(CsvFormatter),
        _ => Box::new(ConsoleFormatter),
    }
}

pub struct ConsoleFormatter;

impl DataFormatter for ConsoleFormatter {
    fn format_reading(&self, topic: &str, reading: &TwistReading) -> String {
        let mut output = format!(
            "🔹 {} [unit {} | tid {}] {}\n",
            topic,
            reading.unit_id,
            reading.transaction_id,
            reading.timestamp.format("%Y-%m-%d %H:%M:%S%.3f")
        );
        for (name, value) in reading.twist.components() {
            output.push_str(&format!("   {:<10} {:>9.3}\n", name, value));
        }
        output
    }

    fn format_header(&self) -> String {
        String::new()
    }

    fn name(&self) -> &str {
        "console"
    }
}

/// One JSON document per line.
pub struct JsonFormatter;

impl DataFormatter for JsonFormatter {
    fn format_reading(&self, topic: &str, reading: &TwistReading) -> String {
        let json_data = serde_json::json!({
            "topic": topic,
            "unit_id": reading.unit_id,
            "transaction_id": reading.transaction_id,
            "timestamp": reading.timestamp.to_rfc3339(),
            "linear": reading.twist.linear,
            "angular": reading.twist.angular,
        });

        json_data.to_string()
    }

    fn format_header(&self) -> String {
        String::new() // JSON doesn't need headers
    }

    fn name(&self) -> &str {
        "json"
    }
}

pub struct CsvFormatter;

impl DataFormatter for CsvFormatter {
    fn format_reading(&self, topic: &str, reading: &TwistReading) -> String {
        let t = &reading.twist;
        format!(
            "{},{},{},{},{},{},{},{},{}",
            reading.timestamp.to_rfc3339(),
            topic,
            reading.transaction_id,
            t.linear.x,
            t.linear.y,
            t.linear.z,
            t.angular.x,
            t.angular.y,
            t.angular.z
        )
    }

    fn format_header(&self) -> String {
        [
            "Timestamp",
            "Topic",
            "TransactionId",
            "LinearX",
            "LinearY",
            "LinearZ",
            "AngularX",
            "AngularY",
            "AngularZ",
        ]
        .join(",")
    }

    fn name(&self) -> &str {
        "csv"
    }
}
