//! HTML parsing for ur-net.go.jp pages.
//!
//! Everything here works on already-rendered HTML so it can be exercised
//! without a browser.

use crate::scrapers::types::{RawComplexTable, RawCoordinates, RawListing, ResultPage, Vacancy};
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;

pub const BASE_URL: &str = "https://www.ur-net.go.jp";

const NO_ROOMS_NOTICE: &str = "ご案内できるお部屋がございません";
const DETAIL_LINK_TEXT: &str = "部屋詳細";
const NEXT_PAGE_TEXT: &str = "次へ";

/// Element the room page must render before it is considered loaded
pub const ROOM_READY_SELECTOR: &str = ".roomprice_body_emphasis";
pub const COMPLEX_READY_SELECTOR: &str = "div.article_sliders_table";
pub const VACANCY_READY_SELECTOR: &str = "tr.js-log-item, .item_no-data, .list_none";
pub const COMPLEX_LINK_SELECTOR: &str = "a.rep_bukken-link";
pub const COMPLEX_HEADING_SELECTOR: &str = "h1.article_headings";

struct Selectors {
    anchor: Selector,
    next_link: Selector,
    complex_link: Selector,
    heading: Selector,
    heading_ruby: Selector,
    rent: Selector,
    price_block: Selector,
    subtitle: Selector,
    room_title: Selector,
    item_title: Selector,
    layout_size: Selector,
    floor: Selector,
    age: Selector,
    lat: Selector,
    lng: Selector,
    table_row: Selector,
    th: Selector,
    td: Selector,
    room_row: Selector,
}

fn parse(css: &str) -> Selector {
    Selector::parse(css).expect("static selector must parse")
}

fn selectors() -> &'static Selectors {
    static CELL: OnceLock<Selectors> = OnceLock::new();
    CELL.get_or_init(|| Selectors {
        anchor: parse("a"),
        next_link: parse("li.next a"),
        complex_link: parse(COMPLEX_LINK_SELECTOR),
        heading: parse(COMPLEX_HEADING_SELECTOR),
        heading_ruby: parse("h1.article_headings ruby span"),
        rent: parse(ROOM_READY_SELECTOR),
        price_block: parse(".roomprice_item, li.roomprice, .roomprice_body"),
        subtitle: parse(".item_subtitle"),
        room_title: parse(".item_title.rep_room-nm"),
        item_title: parse(".item_title"),
        layout_size: parse(".rep_madori-yuka"),
        floor: parse(".rep_kai"),
        age: parse(".rep_years"),
        lat: parse(".js-lat-data"),
        lng: parse(".js-lng-data"),
        table_row: parse("div.article_sliders_table tr"),
        th: parse("th"),
        td: parse("td"),
        room_row: parse("tbody.rep_room tr.js-log-item"),
    })
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .map(text_of)
        .filter(|text| !text.is_empty())
}

/// Area search page for a prefecture code such as "tokyo"
pub fn area_url(area: &str) -> String {
    format!("{}/chintai/kanto/{}/area/", BASE_URL, area)
}

pub fn result_url(area: &str) -> String {
    format!("{}/chintai/kanto/{}/result/", BASE_URL, area)
}

/// Map page derived from a detail page: `xxx_room.html?q` -> `xxx_room_map.html?q`
pub fn map_url(url: &str) -> String {
    match url.rfind(".html") {
        Some(pos) => format!("{}_map{}", &url[..pos], &url[pos..]),
        None => format!("{}_map.html", url.trim_end_matches('/')),
    }
}

fn absolute(href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else {
        format!("{}{}", BASE_URL, href)
    }
}

fn coordinates_in(document: &Html) -> Option<RawCoordinates> {
    let value = |selector: &Selector| {
        document
            .select(selector)
            .next()
            .and_then(|el| el.value().attr("value"))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    let s = selectors();
    Some(RawCoordinates {
        lat: value(&s.lat)?,
        lng: value(&s.lng)?,
    })
}

/// Hidden `.js-lat-data` / `.js-lng-data` inputs
pub fn parse_coordinates(html: &str) -> Option<RawCoordinates> {
    coordinates_in(&Html::parse_document(html))
}

/// Raw fields of a room detail page
pub fn parse_room_page(url: &str, html: &str) -> RawListing {
    let document = Html::parse_document(html);
    let s = selectors();

    RawListing {
        url: url.to_string(),
        rent_text: first_text(&document, &s.rent),
        price_block_text: first_text(&document, &s.price_block),
        subtitle: first_text(&document, &s.subtitle),
        room_title: first_text(&document, &s.room_title)
            .or_else(|| first_text(&document, &s.item_title)),
        layout_size: first_text(&document, &s.layout_size),
        floor: first_text(&document, &s.floor),
        age: first_text(&document, &s.age),
        coordinates: coordinates_in(&document),
    }
}

fn has_next(document: &Html) -> bool {
    let s = selectors();
    document.select(&s.next_link).next().is_some()
        || document
            .select(&s.anchor)
            .any(|a| text_of(a).contains(NEXT_PAGE_TEXT))
}

/// Room detail links ("部屋詳細") in page order, plus whether a next page exists
pub fn parse_result_page(html: &str) -> ResultPage {
    let document = Html::parse_document(html);
    let links = document
        .select(&selectors().anchor)
        .filter(|a| text_of(*a).contains(DETAIL_LINK_TEXT))
        .filter_map(|a| a.value().attr("href"))
        .map(absolute)
        .collect();
    ResultPage {
        links,
        has_next: has_next(&document),
    }
}

/// Complex page links (`a.rep_bukken-link`) in page order, plus the next-page flag
pub fn parse_complex_result_page(html: &str) -> ResultPage {
    let document = Html::parse_document(html);
    let links = document
        .select(&selectors().complex_link)
        .filter_map(|a| a.value().attr("href"))
        .map(absolute)
        .collect();
    ResultPage {
        links,
        has_next: has_next(&document),
    }
}

/// Complex name from the page heading, without the ruby reading
pub fn parse_complex_name(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let s = selectors();
    first_text(&document, &s.heading_ruby).or_else(|| {
        document
            .select(&s.heading)
            .next()
            .map(|h1| h1.text().collect::<String>())
            .and_then(|text| text.trim().lines().next().map(|line| line.trim().to_string()))
            .filter(|name| !name.is_empty())
    })
}

/// Rows of the complex overview table, newlines stripped from values
pub fn parse_complex_table(url: &str, html: &str) -> RawComplexTable {
    let document = Html::parse_document(html);
    let s = selectors();

    let rows = document
        .select(&s.table_row)
        .filter_map(|row| {
            let label = row.select(&s.th).next().map(text_of)?;
            let value = row.select(&s.td).next()?;
            let text = value.text().collect::<String>().replace('\n', "");
            Some((label, text.trim().to_string()))
        })
        .collect();

    RawComplexTable {
        url: url.to_string(),
        rows,
    }
}

/// Vacancy of a complex page. Every room renders as two `js-log-item` rows;
/// a half-rendered pair still counts as a room.
pub fn classify_vacancy(html: &str) -> Vacancy {
    let document = Html::parse_document(html);
    let rows = document.select(&selectors().room_row).count();

    if rows > 0 {
        Vacancy::Available(rows.div_ceil(2))
    } else if html.contains(NO_ROOMS_NOTICE) {
        Vacancy::NoRoomsNotice
    } else {
        Vacancy::NoneFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOM_PAGE: &str = r#"
        <html><body>
          <p class="item_subtitle">コンフォール松原(東京都足立区)
            <span>最寄駅</span></p>
          <h2 class="item_title rep_room-nm">最近見た部屋 3号棟 205号室</h2>
          <ul><li class="roomprice">
            <span class="roomprice_body_emphasis">85,300円</span>
            <span>(3,200円)</span>
          </li></ul>
          <span class="rep_madori-yuka">2DK / 48㎡</span>
          <span class="rep_kai">2階/5階建</span>
          <span class="rep_years">1975年</span>
          <input type="hidden" class="js-lat-data" value="35.7812">
          <input type="hidden" class="js-lng-data" value="139.8123">
        </body></html>
    "#;

    #[test]
    fn test_parse_room_page() {
        let raw = parse_room_page("https://www.ur-net.go.jp/a_room.html", ROOM_PAGE);
        assert_eq!(raw.rent_text.as_deref(), Some("85,300円"));
        assert!(raw.price_block_text.unwrap().contains("(3,200円)"));
        assert!(raw.subtitle.unwrap().starts_with("コンフォール松原(東京都足立区)"));
        assert_eq!(raw.room_title.as_deref(), Some("最近見た部屋 3号棟 205号室"));
        assert_eq!(raw.layout_size.as_deref(), Some("2DK / 48㎡"));
        assert_eq!(raw.floor.as_deref(), Some("2階/5階建"));
        assert_eq!(raw.age.as_deref(), Some("1975年"));
        assert_eq!(
            raw.coordinates,
            Some(RawCoordinates {
                lat: "35.7812".to_string(),
                lng: "139.8123".to_string()
            })
        );
    }

    #[test]
    fn test_parse_room_page_missing_fields() {
        let raw = parse_room_page("u", "<html><body><p>nothing</p></body></html>");
        assert!(raw.rent_text.is_none());
        assert!(raw.coordinates.is_none());
        assert!(raw.layout_size.is_none());
    }

    #[test]
    fn test_coordinates_require_both_markers() {
        let html = r#"<input class="js-lat-data" value="35.1">"#;
        assert!(parse_coordinates(html).is_none());
    }

    #[test]
    fn test_map_url() {
        assert_eq!(
            map_url("https://www.ur-net.go.jp/chintai/kanto/tokyo/20_1960_room.html?JKSS=1"),
            "https://www.ur-net.go.jp/chintai/kanto/tokyo/20_1960_room_map.html?JKSS=1"
        );
        assert_eq!(
            map_url("https://www.ur-net.go.jp/chintai/kanto/tokyo/20_1960_room.html"),
            "https://www.ur-net.go.jp/chintai/kanto/tokyo/20_1960_room_map.html"
        );
        assert_eq!(
            map_url("https://www.ur-net.go.jp/chintai/kanto/tokyo/20_1960.html"),
            "https://www.ur-net.go.jp/chintai/kanto/tokyo/20_1960_map.html"
        );
    }

    #[test]
    fn test_parse_result_page_links_and_pagination() {
        let html = r##"
            <ul>
              <li><a href="/chintai/kanto/tokyo/20_1960_room.html?JKSS=000030">部屋詳細</a></li>
              <li><a href="/other.html">団地詳細</a></li>
              <li>
                <a href="https://www.ur-net.go.jp/chintai/kanto/tokyo/20_2340_room.html">部屋詳細を見る</a>
              </li>
            </ul>
            <ul class="pager"><li class="next"><a href="#">次へ</a></li></ul>
        "##;
        let page = parse_result_page(html);
        assert_eq!(
            page.links,
            vec![
                "https://www.ur-net.go.jp/chintai/kanto/tokyo/20_1960_room.html?JKSS=000030",
                "https://www.ur-net.go.jp/chintai/kanto/tokyo/20_2340_room.html",
            ]
        );
        assert!(page.has_next);
        assert!(!parse_result_page("<ul><li><a href='#'>前へ</a></li></ul>").has_next);
    }

    #[test]
    fn test_parse_complex_table() {
        let html = r#"
            <div class="article_sliders_table"><table>
              <tr><th>家賃</th><td>63,000円～
                  91,200円(3,100円)</td></tr>
              <tr><th>間取り/床面積</th><td>1DK～3DK / 40㎡～67㎡</td></tr>
              <tr><td>no header</td></tr>
            </table></div>
        "#;
        let table = parse_complex_table("u", html);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].0, "家賃");
        assert!(!table.rows[0].1.contains('\n'));
        assert_eq!(table.rows[1].1, "1DK～3DK / 40㎡～67㎡");
    }

    #[test]
    fn test_classify_vacancy() {
        let vacant = r#"<table><tbody class="rep_room">
            <tr class="js-log-item"></tr><tr class="js-log-item"></tr>
            <tr class="js-log-item"></tr><tr class="js-log-item"></tr>
        </tbody></table>"#;
        assert_eq!(classify_vacancy(vacant), Vacancy::Available(2));
        assert_eq!(
            classify_vacancy("<p>ご案内できるお部屋がございません</p>"),
            Vacancy::NoRoomsNotice
        );
        assert_eq!(classify_vacancy("<p></p>"), Vacancy::NoneFound);
    }

    #[test]
    fn test_half_rendered_room_still_counts_as_vacant() {
        let html = r#"<table><tbody class="rep_room">
            <tr class="js-log-item"></tr>
        </tbody></table>"#;
        assert_eq!(classify_vacancy(html), Vacancy::Available(1));

        let three_rows = r#"<table><tbody class="rep_room">
            <tr class="js-log-item"></tr><tr class="js-log-item"></tr>
            <tr class="js-log-item"></tr>
        </tbody></table>"#;
        assert_eq!(classify_vacancy(three_rows), Vacancy::Available(2));
    }

    #[test]
    fn test_parse_complex_result_page() {
        let html = r##"
            <div class="list">
              <a class="rep_bukken-link" href="/chintai/kanto/tokyo/20_1960.html">コンフォール松原</a>
              <a class="rep_bukken-link" href="/chintai/kanto/tokyo/20_2340.html">大島四丁目</a>
              <a href="/chintai/kanto/tokyo/20_1960_room.html">部屋詳細</a>
            </div>
            <a href="#">次へ</a>
        "##;
        let page = parse_complex_result_page(html);
        assert_eq!(
            page.links,
            vec![
                "https://www.ur-net.go.jp/chintai/kanto/tokyo/20_1960.html",
                "https://www.ur-net.go.jp/chintai/kanto/tokyo/20_2340.html",
            ]
        );
        assert!(page.has_next);
        assert!(parse_complex_result_page("<p>0件</p>").links.is_empty());
    }

    #[test]
    fn test_parse_complex_name_prefers_ruby_text() {
        let ruby = r#"<h1 class="article_headings"><ruby><span>コンフォール松原</span>
            <rt>こんふぉーるまつばら</rt></ruby></h1>"#;
        assert_eq!(parse_complex_name(ruby).as_deref(), Some("コンフォール松原"));

        let plain = "<h1 class=\"article_headings\">\n  大島四丁目\n  <small>東京都江東区</small></h1>";
        assert_eq!(parse_complex_name(plain).as_deref(), Some("大島四丁目"));

        assert!(parse_complex_name("<h1>other</h1>").is_none());
    }
}
