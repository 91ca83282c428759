use scraper::{ElementRef, Html, Selector};

use super::error::{Error, Result};
use super::models::ChapterDescriptor;
use super::site::{PageSource, Site, resolve_url};

const TITLE_SELECTORS: [&str; 4] = [
    "h1.entry-title",
    ".post-title h1",
    ".manga-title-badges h1",
    "h1",
];

pub const UNKNOWN_TITLE: &str = "Unknown Manga";

#[derive(Debug, Clone)]
pub struct SeriesPage {
    pub url: String,
    pub manga_title: String,
    pub chapters: Vec<ChapterDescriptor>,
}

fn text_of(element: ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

pub fn extract_chapters(html: &str, page_url: &str) -> Vec<ChapterDescriptor> {
    let document = Html::parse_document(html);
    let (Ok(item_sel), Ok(link_sel), Ok(date_sel)) = (
        Selector::parse("li.wp-manga-chapter"),
        Selector::parse("a"),
        Selector::parse(".chapter-release-date i"),
    ) else {
        return Vec::new();
    };

    document
        .select(&item_sel)
        .filter_map(|item| {
            let link = item.select(&link_sel).next()?;
            let href = link.value().attr("href")?;
            let url = resolve_url(page_url, href).unwrap_or_else(|_| href.to_string());
            let release_date = item
                .select(&date_sel)
                .next()
                .map(text_of)
                .filter(|date| !date.is_empty());

            Some(ChapterDescriptor {
                name: text_of(link),
                url,
                release_date,
            })
        })
        .collect()
}

pub fn extract_manga_title(html: &str) -> String {
    let document = Html::parse_document(html);

    TITLE_SELECTORS
        .iter()
        .filter_map(|sel| Selector::parse(sel).ok())
        .find_map(|selector| {
            document
                .select(&selector)
                .next()
                .map(text_of)
                .filter(|title| !title.is_empty())
        })
        .unwrap_or_else(|| UNKNOWN_TITLE.to_string())
}

/// Reads the chapter list and title off a series page.
pub async fn load_series<S: PageSource + ?Sized>(
    source: &S,
    site: &Site,
    url: &str,
) -> Result<SeriesPage> {
    if !site.is_series_url(url) {
        return Err(Error::NotSeriesPage(url.to_string()));
    }

    let html = source.fetch_text(url).await?;
    let chapters = extract_chapters(&html, url);
    if chapters.is_empty() {
        return Err(Error::NoChapters(url.to_string()));
    }

    let manga_title = extract_manga_title(&html);
    log::info!("found {} chapters of {manga_title}", chapters.len());

    Ok(SeriesPage {
        url: url.to_string(),
        manga_title,
        chapters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::FakeSource;

    const SERIES_URL: &str = "https://manga.detectiveconanar.com/manga/detective-conan/";

    const SERIES_HTML: &str = r#"
        <html><body>
          <div class="post-title"><h1> Detective Conan </h1></div>
          <ul class="main version-chap">
            <li class="wp-manga-chapter">
              <a href="https://manga.detectiveconanar.com/manga/detective-conan/chapter-2/"> Chapter 2 </a>
              <span class="chapter-release-date"><i>March 3, 2024</i></span>
            </li>
            <li class="wp-manga-chapter">
              <a href="chapter-1/">Chapter 1</a>
            </li>
            <li class="wp-manga-chapter"><span>no link here</span></li>
          </ul>
        </body></html>
    "#;

    #[test]
    fn extracts_chapters_with_dates() {
        let chapters = extract_chapters(SERIES_HTML, SERIES_URL);
        assert_eq!(chapters.len(), 2);

        assert_eq!(chapters[0].name, "Chapter 2");
        assert_eq!(chapters[0].release_date.as_deref(), Some("March 3, 2024"));

        assert_eq!(chapters[1].name, "Chapter 1");
        assert_eq!(
            chapters[1].url,
            "https://manga.detectiveconanar.com/manga/detective-conan/chapter-1/"
        );
        assert_eq!(chapters[1].release_date, None);
    }

    #[test]
    fn title_falls_back_through_selectors() {
        assert_eq!(extract_manga_title(SERIES_HTML), "Detective Conan");
        assert_eq!(
            extract_manga_title("<h1 class='entry-title'>Magic Kaito</h1><h1>Other</h1>"),
            "Magic Kaito"
        );
        assert_eq!(extract_manga_title("<h1>  </h1>"), UNKNOWN_TITLE);
        assert_eq!(extract_manga_title("<p>nothing</p>"), UNKNOWN_TITLE);
    }

    #[tokio::test]
    async fn load_series_rejects_foreign_pages() {
        let source = FakeSource::new();
        let result = load_series(&source, &Site::default(), "https://example.com/manga/x/").await;
        assert!(matches!(result, Err(Error::NotSeriesPage(_))));
    }

    #[tokio::test]
    async fn load_series_reads_the_page() {
        let source = FakeSource::new().with_page(SERIES_URL, SERIES_HTML);
        let page = load_series(&source, &Site::default(), SERIES_URL)
            .await
            .unwrap();
        assert_eq!(page.manga_title, "Detective Conan");
        assert_eq!(page.chapters.len(), 2);
    }

    #[tokio::test]
    async fn load_series_fails_without_chapters() {
        let source = FakeSource::new().with_page(SERIES_URL, "<h1>Empty</h1>");
        let result = load_series(&source, &Site::default(), SERIES_URL).await;
        assert!(matches!(result, Err(Error::NoChapters(_))));
    }
}
