//! A local stand-in for the Telegram Bot API, so handlers can be driven
//! without the network.

use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use teloxide::Bot;
use warp::hyper::body::Bytes;
use warp::Filter;

/// Every request received, as `(method, parameters)`.
#[derive(Clone, Default)]
pub struct Calls(Arc<Mutex<Vec<(String, Value)>>>);

impl Calls {
    pub fn all(&self) -> Vec<(String, Value)> {
        self.0.lock().unwrap().clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.all().into_iter().map(|(method, _)| method).collect()
    }

    pub fn of(&self, method: &str) -> Vec<Value> {
        self.all()
            .into_iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params)
            .collect()
    }
}

/// Start a fake Bot API. `answer` gets the method name and parameters and
/// returns the `result`, or `None` for an error reply.
pub fn fake_bot<F>(answer: F) -> (Bot, Calls)
where
    F: Fn(&str, &Value) -> Option<Value> + Send + Sync + 'static,
{
    let calls = Calls::default();
    let recorded = calls.clone();
    let answer = Arc::new(answer);

    let route = warp::post()
        .and(warp::path!(String / String))
        .and(warp::body::bytes())
        .map(move |_token: String, method: String, body: Bytes| {
            // teloxide sends `GetMe`; the Bot API documents `getMe`.
            let mut chars = method.chars();
            let method: String = chars
                .next()
                .map(|c| c.to_ascii_lowercase())
                .into_iter()
                .chain(chars)
                .collect();
            let params: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
            let reply = match answer(&method, &params) {
                Some(result) => json!({"ok": true, "result": result}),
                None => json!({
                    "ok": false,
                    "error_code": 400,
                    "description": "Bad Request: refused by the test server"
                }),
            };
            recorded.0.lock().unwrap().push((method, params));
            warp::reply::json(&reply)
        });

    let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);

    let url = reqwest::Url::parse(&format!("http://{}", addr)).unwrap();
    (Bot::new("123:test").set_api_url(url), calls)
}

pub fn user_json(id: u64, name: &str) -> Value {
    json!({"id": id, "is_bot": false, "first_name": name})
}

pub fn group_json(id: i64, title: &str) -> Value {
    json!({"id": id, "type": "supergroup", "title": title})
}
