use std::error::Error;

use secrecy::SecretString;
use serde::Deserialize;
use serde_json::Value;
use tweetstream_sdk::handler::{Flow, StopReason, StreamHandler};
use tweetstream_sdk::stream::client::{StartOptions, TweetStream};
use tweetstream_sdk::stream::url::MethodOption;

const WANTED: usize = 5;

#[derive(Debug, Deserialize)]
struct Tweet {
    text: String,
    #[serde(default)]
    user: Option<TweetUser>,
}

#[derive(Debug, Deserialize)]
struct TweetUser {
    screen_name: String,
}

struct Collector {
    remaining: usize,
}

impl StreamHandler for Collector {
    fn on_status(&mut self, record: Value) -> Flow {
        if let Ok(tweet) = serde_json::from_value::<Tweet>(record) {
            let author = tweet
                .user
                .map(|user| user.screen_name)
                .unwrap_or_else(|| "?".to_string());
            println!("@{author}: {}", tweet.text);
            self.remaining -= 1;
        }
        if self.remaining == 0 {
            Flow::Stop(StopReason::Shutdown)
        } else {
            Flow::Continue
        }
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
            Collector { remaining: WANTED },
            StartOptions::new()
                .user(user)
                .password(SecretString::new(password)),
        )
        .await?;
        stream.filter(vec![MethodOption::Track(vec![
            "rust".to_string(),
            "erlang".to_string(),
        ])])?;

        let reason = stream.join().await;
        println!("collected {WANTED} tweets, stream ended: {reason:?}");
        Ok::<(), Box<dyn Error>>(())
    })
}
