use crate::repository::ScheduleRow;

pub const CSV_HEADER: &str = "Day,Period,Class,Subject,Teacher,Start Time,End Time,Room";

/// Renders queried rows as CSV. Names are used where the relation was
/// expanded, raw ids otherwise; an absent room renders as an empty field.
pub fn to_csv(rows: &[ScheduleRow]) -> String {
    let mut out = String::with_capacity(64 * (rows.len() + 1));
    out.push_str(CSV_HEADER);
    out.push('\n');
    for row in rows {
        let class = row
            .class_name
            .clone()
            .unwrap_or_else(|| row.entry.class_id.to_string());
        let subject = row
            .subject_name
            .clone()
            .unwrap_or_else(|| row.entry.subject_id.to_string());
        let teacher = row
            .teacher_name
            .clone()
            .unwrap_or_else(|| row.entry.teacher_id.to_string());
        let room = row.entry.room_number.clone().unwrap_or_default();
        let fields = [
            row.entry.day.to_string(),
            row.entry.period.to_string(),
            class,
            subject,
            teacher,
            row.entry.start_time.clone(),
            row.entry.end_time.clone(),
            room,
        ];
        let line: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out
}

/// JSON dump of queried rows.
pub fn to_json(rows: &[ScheduleRow]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(rows)
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ScheduleEntry;
    use crate::timegrid;

    fn row(class_name: Option<&str>) -> ScheduleRow {
        ScheduleRow {
            entry: ScheduleEntry {
                school_id: 1,
                class_id: 1,
                subject_id: 10,
                teacher_id: 100,
                day: 1,
                period: 1,
                room_number: Some("R1".to_string()),
                start_time: timegrid::start_time(1),
                end_time: timegrid::end_time(1),
            },
            class_name: class_name.map(str::to_string),
            subject_name: None,
            teacher_name: None,
        }
    }

    #[test]
    fn csv_has_the_fixed_header_and_one_line_per_row() {
        let csv = to_csv(&[row(Some("7A"))]);
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("Day,Period,Class,Subject,Teacher,Start Time,End Time,Room")
        );
        assert_eq!(lines.next(), Some("1,1,7A,10,100,08:00:00,08:45:00,R1"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn falls_back_to_ids_without_expanded_names() {
        let csv = to_csv(&[row(None)]);
        assert!(csv.lines().nth(1).is_some_and(|l| l.starts_with("1,1,1,10,100")));
    }

    #[test]
    fn quotes_fields_with_embedded_commas() {
        let csv = to_csv(&[row(Some("7A, science track"))]);
        assert!(csv.contains("\"7A, science track\""));
    }

    #[test]
    fn json_dump_round_trips_entry_fields() {
        let json = to_json(&[row(Some("7A"))]).expect("serialize");
        let parsed: serde_json::Value = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed[0]["className"], "7A");
        assert_eq!(parsed[0]["startTime"], "08:00:00");
        assert_eq!(parsed[0]["day"], 1);
    }
}
