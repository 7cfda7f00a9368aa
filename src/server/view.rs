//! Server-rendered status page. Plain HTML tables, no client-side anything;
//! the page is meant for a phone on the home LAN.

use chrono::{DateTime, Utc};

use crate::engine::{EngineStatus, OVERRIDE_WINDOW_MINS};

pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

fn fmt_temp(celsius: f64) -> String {
    format!("{:.2} &deg;C / {:.2} &deg;F", celsius, fahrenheit(celsius))
}

fn fmt_instant(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn fmt_uptime(total_secs: i64) -> String {
    let total_secs = total_secs.max(0);
    let days = total_secs / 86_400;
    let hours = (total_secs % 86_400) / 3_600;
    let mins = (total_secs % 3_600) / 60;
    let secs = total_secs % 60;
    if days > 0 {
        format!("{days}d {hours}h {mins}m {secs}s")
    } else if hours > 0 {
        format!("{hours}h {mins}m {secs}s")
    } else if mins > 0 {
        format!("{mins}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "Yes"
    } else {
        "No"
    }
}

fn on_off(value: bool) -> &'static str {
    if value {
        "On"
    } else {
        "Off"
    }
}

pub fn status_page(status: &EngineStatus, show_graph: bool) -> String {
    let mut page = String::with_capacity(4096);

    page.push_str(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>hearth</title>\n\
         <style>\n\
         body { font-family: sans-serif; margin: 2em; }\n\
         table { border-collapse: collapse; margin-bottom: 1.5em; }\n\
         th, td { border: 1px solid #999; padding: 0.3em 0.8em; text-align: left; }\n\
         </style>\n</head>\n<body>\n<h1>hearth</h1>\n",
    );

    let current_temp = match status.last_temp {
        Some(temp) => fmt_temp(temp),
        None => "no readings yet".to_string(),
    };

    page.push_str("<table>\n");
    page.push_str(&format!(
        "<tr><th>Furnace</th><td>{}</td></tr>\n",
        on_off(status.furnace_on)
    ));
    page.push_str(&format!(
        "<tr><th>Current temperature</th><td>{current_temp}</td></tr>\n"
    ));
    page.push_str(&format!(
        "<tr><th>Active threshold</th><td>{}</td></tr>\n",
        fmt_temp(status.active_temp)
    ));
    page.push_str(&format!(
        "<tr><th>Idle threshold</th><td>{}</td></tr>\n",
        fmt_temp(status.idle_temp)
    ));
    page.push_str(&format!(
        "<tr><th>Override</th><td>{}</td></tr>\n",
        on_off(status.override_active)
    ));
    page.push_str(&format!(
        "<tr><th>House occupied</th><td>{}</td></tr>\n",
        yes_no(status.anybody_home)
    ));
    page.push_str(&format!(
        "<tr><th>Uptime</th><td>{}</td></tr>\n",
        fmt_uptime(status.uptime_secs)
    ));
    page.push_str("</table>\n");

    if status.override_active {
        page.push_str(
            "<form method=\"post\" action=\"/\">\n\
             <input type=\"hidden\" name=\"override\" value=\"off\">\n\
             <button type=\"submit\">Cancel override</button>\n</form>\n",
        );
    } else {
        page.push_str(&format!(
            "<form method=\"post\" action=\"/\">\n\
             <input type=\"hidden\" name=\"override\" value=\"on\">\n\
             <button type=\"submit\">Force burn for {OVERRIDE_WINDOW_MINS} minutes</button>\n</form>\n",
        ));
    }

    page.push_str("<h2>People</h2>\n<table>\n<tr><th>Name</th><th>Last seen</th><th>Home</th></tr>\n");
    for person in &status.people {
        page.push_str(&format!(
            "<tr><td>{}</td><td>{} ago</td><td>{}</td></tr>\n",
            escape(&person.name),
            fmt_uptime(person.seen_secs_ago),
            yes_no(person.home)
        ));
    }
    page.push_str("</table>\n");

    if show_graph {
        page.push_str("<p><a href=\"/\">Hide history</a></p>\n");

        page.push_str(
            "<h2>History</h2>\n<table>\n\
             <tr><th>Time</th><th>Temperature</th><th>Pressure</th><th>Occupied</th></tr>\n",
        );
        for point in &status.history {
            page.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{:.2}</td><td>{}</td></tr>\n",
                fmt_instant(point.timestamp),
                fmt_temp(point.temp),
                point.pressure,
                yes_no(point.inhabited)
            ));
        }
        page.push_str("</table>\n");

        page.push_str(
            "<h2>People home</h2>\n<table>\n<tr><th>Time</th><th>Count</th></tr>\n",
        );
        for point in &status.occupancy {
            page.push_str(&format!(
                "<tr><td>{}</td><td>{}</td></tr>\n",
                fmt_instant(point.timestamp),
                point.count
            ));
        }
        page.push_str("</table>\n");
    } else {
        page.push_str("<p><a href=\"/?graph=on\">Show last week</a></p>\n");
    }

    page.push_str("</body>\n</html>\n");
    page
}
