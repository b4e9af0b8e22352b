use futures_util::{SinkExt, StreamExt};
use hub_protocol::Envelope;
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::tungstenite::protocol::Message;

type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub struct MockWsClient {
    write: futures_util::stream::SplitSink<WsStream, Message>,
    read: futures_util::stream::SplitStream<WsStream>,
}

impl MockWsClient {
    pub async fn connect(url: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url).await?;
        let (write, read) = ws_stream.split();
        Ok(Self { write, read })
    }

    /// Send a single envelope.
    pub async fn send(&mut self, envelope: &Envelope) -> Result<(), Box<dyn std::error::Error>> {
        let json = serde_json::to_string(envelope)?;
        self.write.send(Message::Text(json.into())).await?;
        Ok(())
    }

    /// Receive the next envelope, skipping Ping/Pong control frames.
    ///
    /// A transport frame may coalesce several newline-joined envelopes; this
    /// only ever returns the first one per `Message::Text` received, matching
    /// how a real client reads one logical message at a time off its queue.
    pub async fn recv(&mut self) -> Result<Envelope, Box<dyn std::error::Error>> {
        loop {
            match self.read.next().await {
                Some(Ok(Message::Text(text))) => {
                    let first_line = text.split('\n').next().unwrap_or(&text);
                    let envelope: Envelope = serde_json::from_str(first_line)?;
                    return Ok(envelope);
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) => return Err("connection closed by server".into()),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Err("connection stream ended".into()),
            }
        }
    }

    pub async fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.write.send(Message::Close(None)).await?;
        Ok(())
    }
}
