//! The single HTML page: hour picker, prediction banner, Plotly map.

use crate::predictor::PredictionResult;
use std::fmt::Write;

const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// JSON placed inside `<script>` must not be able to close the tag.
fn escape_script_json(json: &str) -> String {
    json.replace("</", "<\\/")
}

pub fn render(graph_json: &str, prediction: Option<&PredictionResult>) -> String {
    let mut hours = String::new();
    for h in 0..24 {
        let _ = write!(hours, "<option value=\"{h}\">{h} h</option>");
    }

    let banner = match prediction {
        Some(p) => format!(
            "<p id=\"prediction\" style=\"color: {}; font-weight: bold;\">{}</p>",
            escape_html(p.color),
            escape_html(&p.text)
        ),
        None => String::new(),
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Real-time traffic</title>
<script src="{cdn}"></script>
</head>
<body>
<h1>Real-time traffic</h1>
<form method="post" action="/">
<label for="hour">Hour to predict</label>
<select id="hour" name="hour">{hours}</select>
<button type="submit">Predict</button>
</form>
{banner}
<div id="map"></div>
<script>
var figure = {graph};
Plotly.newPlot("map", figure.data, figure.layout);
</script>
</body>
</html>
"#,
        cdn = PLOTLY_CDN,
        hours = hours,
        banner = banner,
        graph = escape_script_json(graph_json),
    )
}
