//! The browser landing page served on a plain (non-upgrade) `GET` (§4.5),
//! ported from `original_source/pinghub.go`'s `webTemplate`.
//!
//! The original interpolates `r.URL.Path` into both an HTML document and a
//! JavaScript string literal via `html/template`, which auto-escapes both
//! contexts. This hand-renders the same template with explicit escaping for
//! each context, since the path is attacker-controlled input.

const STYLE: &str = r#"
html { overflow: hidden; }
body { overflow: hidden; padding: 0.5em; margin: 0; width: 100%; height: 100%; background: gray; }
#log { background: white; margin: 0; padding: 0.5em; position: absolute; top: 2.0em; left: 0.5em; right: 0.5em; bottom: 3em; overflow: auto; }
#form { padding: 0 0.5em 0 0.5em; margin: 0; position: absolute; bottom: 0.5em; left: 0px; width: 100%; overflow: hidden; }
"#;

const SCRIPT: &str = r#"
$(function() {
    var conn;
    var msg = $("#msg");
    var log = $("#log");

    function appendLog(entry) {
        var d = log[0];
        var doScroll = d.scrollTop == d.scrollHeight - d.clientHeight;
        entry.appendTo(log);
        if (doScroll) {
            d.scrollTop = d.scrollHeight - d.clientHeight;
        }
    }

    $("#form").submit(function() {
        if (!conn || !msg.val()) {
            return false;
        }
        conn.send(msg.val());
        msg.val("");
        return false;
    });

    if (window["WebSocket"]) {
        conn = new WebSocket("__WS_URL__");
        conn.onclose = function(evt) {
            appendLog($("<div><b>Connection closed.</b></div>"));
        };
        conn.onmessage = function(evt) {
            appendLog($("<div/>").text(evt.data));
        };
        msg.focus();
    } else {
        appendLog($("<div><b>Your browser does not support WebSockets.</b></div>"));
    }
});
"#;

/// Render the landing page for `path`, with the WebSocket URL pointed at
/// `addr` (the listen address operators passed via `--addr`).
pub fn render(addr: &str, path: &str) -> String {
    let ws_url = format!("ws://{}{}", addr, path);
    let script = SCRIPT.replacen("__WS_URL__", &escape_js_string(&ws_url), 1);
    let escaped_path = escape_html(path);

    format!(
        r#"<html>
<head>
<title>pinghub {escaped_path}</title>
<script type="text/javascript" src="http://ajax.googleapis.com/ajax/libs/jquery/1.4.2/jquery.min.js"></script>
<script type="text/javascript">{script}</script>
<style type="text/css">{STYLE}</style>
</head>
<body>
<h3>Websocket client for {escaped_path}</h3>
<div id="log"></div>
<form id="form">
    <input type="submit" value="Send" />
    <input type="text" id="msg" size="64"/>
</form>
</body>
</html>
"#
    )
}

fn escape_html(s: &str) -> String {
    s.chars().fold(String::with_capacity(s.len()), |mut out, c| {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
        out
    })
}

fn escape_js_string(s: &str) -> String {
    s.chars().fold(String::with_capacity(s.len()), |mut out, c| {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '<' => out.push_str("\\x3C"),
            other => out.push(other),
        }
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_the_requested_path_into_the_page() {
        let page = render("127.0.0.1:8081", "/room");
        assert!(page.contains("pinghub /room"));
        assert!(page.contains("ws://127.0.0.1:8081/room"));
    }

    #[test]
    fn escapes_html_metacharacters_in_the_path() {
        let page = render("127.0.0.1:8081", "/<script>alert(1)</script>");
        assert!(!page.contains("<script>alert(1)</script>"));
        assert!(page.contains("&lt;script&gt;"));
    }
}
