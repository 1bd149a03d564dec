use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;

const DEFAULT_ADDR: &str = "127.0.0.1:5000";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    message_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    name: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    value: Value,
}

fn envelope(message_type: &str, value: Value) -> Envelope {
    Envelope {
        message_type: message_type.to_string(),
        name: String::new(),
        value,
    }
}

fn settings_snapshot() -> Envelope {
    envelope(
        "translate_settings",
        json!({
            "src_lang": "auto",
            "trg_lang": "de",
            "whisper_task": "transcribe",
            "stt_enabled": true,
            "tts_voice": "default",
            "tts_model": ["en", "v3_en"],
            "osc_auto_processing_enabled": true,
            "whisper_languages": [
                {"name": "English", "code": "en"},
                {"name": "German", "code": "de"}
            ]
        }),
    )
}

fn tts_voices() -> Envelope {
    envelope("tts_voices", json!({"data": ["default", "narrator"]}))
}

async fn serve(
    tcp: TcpStream,
    mut lines: broadcast::Receiver<String>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let peer = tcp.peer_addr()?;
    let ws = tokio_tungstenite::accept_async(tcp).await?;
    println!("backend-stub: ui attached from {peer}");
    let (mut sink, mut source) = ws.split();

    loop {
        tokio::select! {
            frame = source.next() => {
                let Some(frame) = frame else { break };
                let frame = frame?;
                if frame.is_close() {
                    break;
                }
                let Ok(text) = frame.to_text() else { continue };
                let msg: Envelope = match serde_json::from_str(text) {
                    Ok(msg) => msg,
                    Err(err) => {
                        eprintln!("backend-stub: bad frame: {err}");
                        continue;
                    }
                };
                println!("<- {} {} {}", msg.message_type, msg.name, msg.value);
                if msg.message_type == "setting_update_req" || msg.message_type == "ui_connected" {
                    for reply in [settings_snapshot(), tts_voices()] {
                        sink.send(Message::text(serde_json::to_string(&reply)?)).await?;
                        println!("-> {}", reply.message_type);
                    }
                }
            }
            line = lines.recv() => {
                let Ok(line) = line else { break };
                sink.send(Message::text(line)).await?;
                println!("-> (stdin)");
            }
        }
    }
    println!("backend-stub: ui detached from {peer}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());
    let listener = TcpListener::bind(&addr).await?;
    println!("backend-stub: listening on ws://{addr}/");

    let (line_tx, _) = broadcast::channel::<String>(64);
    let stdin_tx = line_tx.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            if serde_json::from_str::<Envelope>(&line).is_err() {
                eprintln!("backend-stub: stdin line is not an envelope, ignored");
                continue;
            }
            let _ = stdin_tx.send(line);
        }
    });

    loop {
        let (tcp, _) = listener.accept().await?;
        let lines = line_tx.subscribe();
        tokio::spawn(async move {
            if let Err(err) = serve(tcp, lines).await {
                eprintln!("backend-stub: session ended: {err}");
            }
        });
    }
}
