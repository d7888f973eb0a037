use std::cmp::Reverse;

use anyhow::{anyhow, Context, Result};
use rss::extension::itunes::{
    ITunesCategoryBuilder, ITunesChannelExtensionBuilder, ITunesItemExtensionBuilder,
    ITunesOwnerBuilder,
};
use rss::{ChannelBuilder, EnclosureBuilder, GuidBuilder, ImageBuilder, Item, ItemBuilder};
use time::format_description::well_known::Rfc2822;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::OffsetDateTime;
use time_tz::{timezones, OffsetDateTimeExt};
use tracing::error;

use crate::storage::entities::{Program, RssState, User};

pub const DEFAULT_MAX_EPISODES: usize = 30;
pub const DEFAULT_AUTHOR_NAME: &str = "Podfeed";
pub const DEFAULT_AUTHOR_EMAIL: &str = "podcast@podfeed.example";

const LANGUAGE: &str = "ja";
const CATEGORY: &str = "Technology";
const AUDIO_MIME_TYPE: &str = "audio/mpeg";

static TITLE_DATE_FORMAT: &[BorrowedFormatItem<'_>] =
    format_description!("[year]/[month]/[day]");

#[derive(Debug, Clone)]
pub struct RssOptions {
    pub max_episodes: usize,
    pub site_url: String,
    pub default_image_url: Option<String>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
}

impl Default for RssOptions {
    fn default() -> Self {
        Self {
            max_episodes: DEFAULT_MAX_EPISODES,
            site_url: "https://podfeed.example".into(),
            default_image_url: None,
            author_name: None,
            author_email: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeneratedRss {
    pub xml: String,
    pub episode_count: usize,
    pub generated_at: OffsetDateTime,
}

fn format_rfc2822(date: OffsetDateTime) -> Option<String> {
    date.format(&Rfc2822)
        .inspect_err(|e| error!("could not format the date ({date}): {e:#}"))
        .ok()
}

/// Formats the episode date shown in titles. Always in Japan time.
fn title_date(created_at: OffsetDateTime) -> Result<String> {
    let local = created_at.to_timezone(timezones::db::asia::TOKYO);

    local
        .format(TITLE_DATE_FORMAT)
        .with_context(|| anyhow!("could not format the date {created_at}"))
}

fn make_item(user: &User, program: &Program, options: &RssOptions) -> Result<Item> {
    let title = format!("{} {}", title_date(program.created_at)?, program.title);
    let duration_secs = program.audio_duration.max(0) / 1000;
    let image = program
        .image_url
        .clone()
        .or_else(|| options.default_image_url.clone());

    Ok(ItemBuilder::default()
        .title(Some(title))
        .description(Some(program.title.clone()))
        .guid(Some(
            GuidBuilder::default()
                .value(format!("podfeed/{}/{}", user.id, program.id))
                .permalink(false)
                .build(),
        ))
        .pub_date(format_rfc2822(program.created_at))
        .enclosure(Some(
            EnclosureBuilder::default()
                .url(program.audio_url.clone())
                .length("0".to_owned())
                .mime_type(AUDIO_MIME_TYPE.to_owned())
                .build(),
        ))
        .itunes_ext(Some(
            ITunesItemExtensionBuilder::default()
                .duration(Some(duration_secs.to_string()))
                .image(image)
                .explicit(Some("false".to_owned()))
                .build(),
        ))
        .build())
}

/// Renders a user's personal podcast feed.
///
/// Only the newest `options.max_episodes` programs are included, newest first.
pub fn generate_user_rss(
    user: &User,
    programs: &[Program],
    options: &RssOptions,
) -> Result<GeneratedRss> {
    let mut programs = programs.iter().collect::<Vec<_>>();
    programs.sort_by_key(|program| Reverse(program.created_at));
    programs.truncate(options.max_episodes);

    let items = programs
        .iter()
        .map(|program| make_item(user, program, options))
        .collect::<Result<Vec<_>>>()?;
    let episode_count = items.len();

    let author_name = options
        .author_name
        .clone()
        .unwrap_or_else(|| DEFAULT_AUTHOR_NAME.to_owned());
    let author_email = options
        .author_email
        .clone()
        .unwrap_or_else(|| DEFAULT_AUTHOR_EMAIL.to_owned());
    let title = format!("{}のパーソナルプログラム", user.display_name);
    let description = format!(
        "{}さんの興味に合わせて毎日お届けする技術記事の解説番組です。",
        user.display_name
    );

    let generated_at = OffsetDateTime::now_utc();
    let mut channel = ChannelBuilder::default();
    channel
        .title(title.clone())
        .link(options.site_url.clone())
        .description(description)
        .language(Some(LANGUAGE.to_owned()))
        .managing_editor(Some(format!("{author_email} ({author_name})")))
        .last_build_date(format_rfc2822(generated_at))
        .generator(Some(format!("Podfeed {}", env!("CARGO_PKG_VERSION"))))
        .image(options.default_image_url.as_ref().map(|url| {
            ImageBuilder::default()
                .url(url.clone())
                .title(title.clone())
                .link(options.site_url.clone())
                .build()
        }))
        .itunes_ext(Some(
            ITunesChannelExtensionBuilder::default()
                .author(Some(author_name.clone()))
                .owner(Some(
                    ITunesOwnerBuilder::default()
                        .name(Some(author_name))
                        .email(Some(author_email))
                        .build(),
                ))
                .categories(vec![ITunesCategoryBuilder::default().text(CATEGORY).build()])
                .image(options.default_image_url.clone())
                .explicit(Some("false".to_owned()))
                .build(),
        ))
        .items(items);

    Ok(GeneratedRss {
        xml: channel.build().to_string(),
        episode_count,
        generated_at,
    })
}

/// Lists the reasons a user's feed would be incomplete or unusable.
///
/// An empty list means the feed can be generated as is.
pub fn validate_rss_generation(user: &User, programs: &[Program]) -> Vec<String> {
    let mut problems = vec![];

    if matches!(user.rss, RssState::Disabled) {
        problems.push("the user has no RSS token".to_owned());
    }

    if user.display_name.trim().is_empty() {
        problems.push("the user has no display name".to_owned());
    }

    if programs.is_empty() {
        problems.push("there are no programs to publish".to_owned());
    }

    for program in programs {
        if program.audio_url.trim().is_empty() {
            problems.push(format!("program #{} has no audio URL", program.id));
        }

        if program.audio_duration <= 0 {
            problems.push(format!(
                "program #{} has a non-positive duration ({} ms)",
                program.id, program.audio_duration
            ));
        }
    }

    problems
}
