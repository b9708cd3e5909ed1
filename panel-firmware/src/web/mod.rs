// Web-Modul: Dashboard-Seite und WebSocket-Protokoll der Update-Steuerung

pub mod protocol;

// Dashboard wird zur Compile-Zeit ins Binary eingebettet
pub const INDEX_HTML: &str = include_str!("index.html");
