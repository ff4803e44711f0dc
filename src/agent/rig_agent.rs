use std::path::Path;

use anyhow::anyhow;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rig::OneOrMany;
use rig::agent::Agent;
use rig::completion::Prompt;
use rig::message::{ContentFormat, ImageDetail, ImageMediaType, Message, UserContent};
use rig::providers::openrouter;
use tracing::{info, warn};

use super::{ChatAgent, MENU_CREATOR_PREAMBLE};
use crate::config::Config;
use crate::tools::{
    AnalyzeWebsiteStyles, FindMenuFiles, PopulateMenuFromDb, PreviewImageFromUrl, ReadHtmlPart,
    ReviewImage, SaveHtmlFile, SaveMenuToDb, TakeMenuScreenshots, ToolContext, UpdateHtmlFile,
    UploadMenuImages, WebSearch,
};

/// Follow-up prompts carrying queued images, per user message.
const MAX_REVIEW_ROUNDS: usize = 3;

/// MenuCreator on OpenRouter. The agent is rebuilt for every turn so the
/// tools see that turn's menu and event stream.
pub struct RigMenuAgent {
    api_key: String,
    model: String,
    max_turns: usize,
}

impl RigMenuAgent {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let api_key = config
            .openrouter_api_key
            .clone()
            .ok_or_else(|| anyhow!("OPENROUTER_API_KEY not set"))?;
        Ok(Self {
            api_key,
            model: config.agent_model.clone(),
            max_turns: config.agent_max_turns,
        })
    }

    fn build(&self, ctx: &ToolContext) -> Agent<openrouter::CompletionModel> {
        let client = openrouter::Client::new(&self.api_key);
        let mut builder = client
            .agent(&self.model)
            .preamble(MENU_CREATOR_PREAMBLE)
            .tool(AnalyzeWebsiteStyles::new(ctx.clone()))
            .tool(FindMenuFiles::new(ctx.clone()))
            .tool(TakeMenuScreenshots::new(ctx.clone()))
            .tool(UploadMenuImages::new(ctx.clone()))
            .tool(PreviewImageFromUrl::new(ctx.clone()))
            .tool(SaveHtmlFile::new(ctx.clone()))
            .tool(UpdateHtmlFile::new(ctx.clone()))
            .tool(ReadHtmlPart::new(ctx.clone()))
            .tool(PopulateMenuFromDb::new(ctx.clone()))
            .tool(SaveMenuToDb::new(ctx.clone()));
        if ctx.services().web_search.is_some() {
            builder = builder.tool(WebSearch::new(ctx.clone()));
        }
        builder.build()
    }
}

#[async_trait]
impl ChatAgent for RigMenuAgent {
    async fn respond(
        &self,
        history: &mut Vec<Message>,
        message: &str,
        ctx: ToolContext,
    ) -> anyhow::Result<String> {
        let agent = self.build(&ctx);
        let mut reply = agent
            .prompt(message)
            .with_history(&mut *history)
            .multi_turn(self.max_turns)
            .await?;

        for _ in 0..MAX_REVIEW_ROUNDS {
            let images = ctx.take_pending_images();
            if images.is_empty() {
                break;
            }
            info!("Sending {} image(s) to the agent for review", images.len());
            let Some(review) = review_message(&images).await else {
                break;
            };
            reply = agent
                .prompt(review)
                .with_history(&mut *history)
                .multi_turn(self.max_turns)
                .await?;
        }

        Ok(reply)
    }
}

fn image_media_type(path: &Path) -> ImageMediaType {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "jpg" | "jpeg" => ImageMediaType::JPEG,
        "gif" => ImageMediaType::GIF,
        "webp" => ImageMediaType::WEBP,
        _ => ImageMediaType::PNG,
    }
}

/// User message with the queued images inlined as base64. `None` when none
/// of the files could be read.
async fn review_message(images: &[ReviewImage]) -> Option<Message> {
    let mut content = vec![UserContent::text(
        "Images queued by your tools for visual review. Look at them before continuing.",
    )];
    for image in images {
        match tokio::fs::read(&image.path).await {
            Ok(bytes) => {
                content.push(UserContent::text(image.label.clone()));
                content.push(UserContent::image(
                    STANDARD.encode(bytes),
                    Some(ContentFormat::Base64),
                    Some(image_media_type(&image.path)),
                    Some(ImageDetail::Low),
                ));
            }
            Err(e) => warn!("Skipping review image {}: {}", image.path.display(), e),
        }
    }
    if content.len() == 1 {
        return None;
    }
    OneOrMany::many(content).ok().map(|content| Message::User { content })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_media_type_from_extension() {
        assert!(matches!(image_media_type(Path::new("a.JPG")), ImageMediaType::JPEG));
        assert!(matches!(image_media_type(Path::new("a.webp")), ImageMediaType::WEBP));
        assert!(matches!(image_media_type(Path::new("a")), ImageMediaType::PNG));
    }

    #[tokio::test]
    async fn test_review_message_skips_unreadable_files() {
        let dir = tempfile::tempdir().unwrap();
        let page = dir.path().join("page_1.png");
        std::fs::write(&page, b"\x89PNG").unwrap();

        let images = vec![
            ReviewImage { path: page, label: "page 1".to_string() },
            ReviewImage { path: PathBuf::from("/nonexistent.png"), label: "gone".to_string() },
        ];
        match review_message(&images).await {
            Some(Message::User { content }) => assert_eq!(content.len(), 3),
            other => panic!("unexpected message: {:?}", other),
        }

        let missing = vec![ReviewImage { path: PathBuf::from("/nonexistent.png"), label: "gone".to_string() }];
        assert!(review_message(&missing).await.is_none());
    }

    #[test]
    fn test_requires_api_key() {
        let config = Config::for_tests(std::env::temp_dir());
        assert!(RigMenuAgent::from_config(&config).is_err());
    }
}
