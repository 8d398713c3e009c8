use std::sync::Arc;

use minijinja::{Environment, Value, context};
use parking_lot::RwLock;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use repack_config::{Config, ServeMode};
use repack_fetch::ArchiveFetcher;

use crate::produce::{ProduceError, ProducedArchive, produce_archive};

const INDEX_TEMPLATE: &str = "index.html";

/// Characters escaped in a single URL path segment. Includes everything HTML
/// would escape so the encoded link can be inserted into the page verbatim.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'\'')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    fetcher: ArchiveFetcher,
    /// The most recently produced archive, if any run succeeded.
    current: RwLock<Option<ProducedArchive>>,
    /// Held for the whole duration of a run so concurrent rebuilds do not race
    /// on the same output file.
    build_lock: tokio::sync::Mutex<()>,
    templates: Environment<'static>,
}

impl AppState {
    pub fn new(config: Config, fetcher: ArchiveFetcher) -> Result<Self, minijinja::Error> {
        let mut templates = Environment::new();
        templates.add_template(INDEX_TEMPLATE, include_str!("templates/index.html"))?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                fetcher,
                current: RwLock::new(None),
                build_lock: tokio::sync::Mutex::new(()),
                templates,
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn current(&self) -> Option<ProducedArchive> {
        self.inner.current.read().clone()
    }

    /// Produces the archive again and records it as current. A failed run
    /// keeps the previous archive current.
    pub async fn rebuild(&self) -> Result<ProducedArchive, ProduceError> {
        let _guard = self.inner.build_lock.lock().await;
        let produced = produce_archive(&self.inner.config, &self.inner.fetcher).await?;
        *self.inner.current.write() = Some(produced.clone());
        Ok(produced)
    }

    pub(crate) fn render_index(&self) -> Result<String, minijinja::Error> {
        let config = self.config();
        let current = self.current();
        let lazy = config.serve_mode == ServeMode::Lazy;

        let link_name = match &current {
            Some(archive) => Some(archive.file_name.as_str()),
            None if lazy => Some(config.output_name.as_str()),
            None => None,
        };
        let href = link_name.map(|name| Value::from_safe_string(download_href(name)));

        let archive = current.map(|archive| {
            context! {
                file_name => archive.file_name,
                root_name => archive.root_name,
                size => archive.size,
            }
        });

        self.inner.templates.get_template(INDEX_TEMPLATE)?.render(context! {
            title => "Repository archive",
            archive,
            lazy,
            href,
            output_name => config.output_name,
            branch => config.branch,
        })
    }
}

/// The link the index page uses to download `file_name`.
pub fn download_href(file_name: &str) -> String {
    format!("/download/{}", utf8_percent_encode(file_name, PATH_SEGMENT))
}
