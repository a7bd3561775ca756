//! Human-like input pacing.

use gembridge_browser::Page;
use gembridge_core::config::DelayRange;
use rand::Rng;
use std::time::Duration;

/// A uniformly drawn delay within the inclusive range.
pub fn sample(range: DelayRange) -> Duration {
    if range.min >= range.max {
        return Duration::from_millis(range.min);
    }
    let ms = rand::rng().random_range(range.min..=range.max);
    Duration::from_millis(ms)
}

pub async fn pause(range: DelayRange) {
    tokio::time::sleep(sample(range)).await;
}

/// Type `text` one character at a time with a randomized gap between keystrokes.
pub async fn type_like_human(
    page: &dyn Page,
    text: &str,
    delay: DelayRange,
) -> gembridge_core::Result<()> {
    for (i, ch) in text.chars().enumerate() {
        if i > 0 {
            pause(delay).await;
        }
        page.type_char(ch).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::ScriptedPage;
    use gembridge_core::config::SelectorsConfig;
    use tokio::time::Instant;

    #[test]
    fn test_sample_stays_in_range() {
        let range = DelayRange::new(50, 150);
        for _ in 0..500 {
            let d = sample(range);
            assert!(d >= Duration::from_millis(50) && d <= Duration::from_millis(150));
        }
    }

    #[test]
    fn test_degenerate_range() {
        assert_eq!(sample(DelayRange::new(0, 0)), Duration::ZERO);
        assert_eq!(sample(DelayRange::new(300, 300)), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_sleeps_within_range() {
        let start = tokio::time::Instant::now();
        pause(DelayRange::new(500, 1500)).await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(500) && waited <= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_is_paced_per_character() {
        let selectors = SelectorsConfig::default();
        let page = ScriptedPage::new(selectors.clone());
        page.click_at(&selectors.prompt_input, 0).await.unwrap();
        let text = "hello world";
        let gaps = text.chars().count() as u32 - 1;

        let start = Instant::now();
        type_like_human(&page, text, DelayRange::new(50, 150)).await.unwrap();
        let took = start.elapsed();

        assert!(took >= Duration::from_millis(50) * gaps, "too fast: {:?}", took);
        assert!(took <= Duration::from_millis(150) * gaps, "too slow: {:?}", took);
        let input = page.query(&selectors.prompt_input).await.unwrap();
        assert_eq!(input[0].text, text);
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_stops_on_page_error() {
        let page = ScriptedPage::new(SelectorsConfig::default());
        // Nothing focused yet.
        let start = Instant::now();
        assert!(type_like_human(&page, "abc", DelayRange::new(50, 150)).await.is_err());
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
