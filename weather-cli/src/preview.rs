use weather_etl_core::WeatherTable;

const HEADERS: [&str; 5] = ["city", "country", "temperature", "humidity", "description"];

/// Fixed-width preview of the columns people look at first.
pub fn render(table: &WeatherTable) -> String {
    let cells: Vec<[String; 5]> = table
        .rows()
        .iter()
        .map(|r| {
            [
                r.city.clone(),
                r.country.clone(),
                format!("{:.1}", r.temperature),
                r.humidity.to_string(),
                r.description.clone(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(|h| h.chars().count());
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let rule = "=".repeat(60);
    let mut out = format!("{rule}\nRESULTS PREVIEW\n{rule}\n");
    out.push_str(&line(&HEADERS.map(String::from), &widths));
    for row in &cells {
        out.push_str(&line(row, &widths));
    }
    out.push_str(&rule);
    out
}

fn line(cells: &[String; 5], widths: &[usize; 5]) -> String {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect();
    format!("{}\n", padded.join("  ").trim_end())
}
