//! Prompt construction for the sentiment oracle.

use crate::collector::{CorpusItem, SignalCorpus};

const REDDIT_SAMPLE: usize = 3;
const NEWS_SAMPLE: usize = 2;
const TWITTER_SAMPLE: usize = 5;
const REDDIT_ITEM_CHARS: usize = 200;
const NEWS_ITEM_CHARS: usize = 150;
const TWITTER_ITEM_CHARS: usize = 100;

pub const SYSTEM_PROMPT: &str = "You are a cryptocurrency market sentiment analyst. \
Provide objective sentiment analysis based only on the data you are given.";

/// Build the sentiment analysis prompt for one symbol, bounded by
/// `max_chars`. Source sections are shaved evenly when the assembled prompt
/// runs over budget; the instruction block is never cut.
pub fn sentiment_prompt(coin: &str, corpus: &SignalCorpus, max_chars: usize) -> String {
    let mut reddit = section("REDDIT", &corpus.reddit, REDDIT_SAMPLE, REDDIT_ITEM_CHARS);
    let mut news = section("NEWS", &corpus.news, NEWS_SAMPLE, NEWS_ITEM_CHARS);
    let mut twitter = section("TWITTER", &corpus.twitter, TWITTER_SAMPLE, TWITTER_ITEM_CHARS);

    let mut prompt = assemble(coin, &reddit, &news, &twitter);
    if prompt.chars().count() > max_chars {
        let excess = prompt.chars().count() - max_chars;
        let cut = excess / 3 + 1;
        reddit = shave(&reddit, cut);
        news = shave(&news, cut);
        twitter = shave(&twitter, cut);
        prompt = assemble(coin, &reddit, &news, &twitter);
    }
    prompt
}

fn assemble(coin: &str, reddit: &str, news: &str, twitter: &str) -> String {
    format!(
        "Analyze the market sentiment for the cryptocurrency {coin} based on the data below.\n\
         \n\
         AVAILABLE DATA:\n\
         \n\
         {reddit}\n\
         \n\
         {news}\n\
         \n\
         {twitter}\n\
         \n\
         INSTRUCTIONS:\n\
         Respond with a JSON object containing exactly these fields:\n\
         - sentiment: \"very positive\", \"positive\", \"neutral\", \"negative\" or \"very negative\"\n\
         - score: a number from 0 to 100, where 0 is extremely negative and 100 is extremely positive\n\
         - buy_recommendation: \"YES\", \"NO\" or \"NEUTRAL\"\n\
         - key_factors: an array of 2-3 short sentences on the factors driving the sentiment\n\
         - reddit_sentiment: \"positive\", \"negative\" or \"neutral\"\n\
         - news_sentiment: \"positive\", \"negative\" or \"neutral\"\n\
         - twitter_sentiment: \"positive\", \"negative\" or \"neutral\"\n\
         \n\
         Respond ONLY with the JSON, no additional explanation."
    )
}

fn section(name: &str, items: &[CorpusItem], sample: usize, item_chars: usize) -> String {
    let mut body = String::new();
    for item in items.iter().take(sample) {
        let text: String = item.text.chars().take(item_chars).collect();
        body.push_str(&format!("{}: {} - {}\n", item.source, item.title, text));
    }
    if body.is_empty() {
        body.push_str("No data available.\n");
    }
    format!("=== {} ===\n{}", name, body.trim_end())
}

fn shave(section_text: &str, cut: usize) -> String {
    let len = section_text.chars().count();
    if len <= cut {
        return section_text.to_string();
    }
    section_text.chars().take(len - cut).collect()
}
