use std::error::Error;

use secrecy::SecretString;
use serde_json::Value;
use tweetstream_sdk::handler::{Flow, StreamEvent, StreamHandler};
use tweetstream_sdk::stream::client::{StartOptions, TweetStream};

struct Printer {
    statuses: usize,
}

impl StreamHandler for Printer {
    fn on_status(&mut self, record: Value) -> Flow {
        self.statuses += 1;
        let text = record
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or("<no text>");
        println!("{:>5} {text}", self.statuses);
        Flow::Continue
    }

    fn on_event(&mut self, event: StreamEvent) -> Flow {
        println!("event: {event:?}");
        Flow::Continue
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let user = "REPLACE_WITH_USER".to_string();
    let password = "REPLACE_WITH_PASSWORD".to_string();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let stream = TweetStream::start(
            Printer { statuses: 0 },
            StartOptions::new()
                .user(user)
                .password(SecretString::new(password)),
        )
        .await?;
        stream.sample(Vec::new())?;

        let reason = stream.join().await;
        println!("stream ended: {reason:?}");
        Ok::<(), Box<dyn Error>>(())
    })
}
