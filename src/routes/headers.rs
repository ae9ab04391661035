//! Alert and pagination response headers read by the frontend

use actix_web::{HttpRequest, HttpResponseBuilder};

use crate::models::Page;

/// Prefix of translation keys in alerts
pub const APP_NAME: &str = "animeCatalogApp";

pub const ALERT_HEADER: &str = "X-animeCatalogApp-alert";
pub const PARAMS_HEADER: &str = "X-animeCatalogApp-params";
pub const ERROR_HEADER: &str = "X-animeCatalogApp-error";
pub const TOTAL_COUNT_HEADER: &str = "X-Total-Count";

/// Add an alert with a translation key such as `userManagement.created`
pub fn alert<'b>(
    builder: &'b mut HttpResponseBuilder,
    message_key: &str,
    param: &str,
) -> &'b mut HttpResponseBuilder {
    builder
        .insert_header((ALERT_HEADER, format!("{}.{}", APP_NAME, message_key)))
        .insert_header((PARAMS_HEADER, param.to_string()))
}

pub fn creation_alert<'b>(
    builder: &'b mut HttpResponseBuilder,
    entity_name: &str,
    param: &str,
) -> &'b mut HttpResponseBuilder {
    alert(builder, &format!("{}.created", entity_name), param)
}

pub fn update_alert<'b>(
    builder: &'b mut HttpResponseBuilder,
    entity_name: &str,
    param: &str,
) -> &'b mut HttpResponseBuilder {
    alert(builder, &format!("{}.updated", entity_name), param)
}

pub fn deletion_alert<'b>(
    builder: &'b mut HttpResponseBuilder,
    entity_name: &str,
    param: &str,
) -> &'b mut HttpResponseBuilder {
    alert(builder, &format!("{}.deleted", entity_name), param)
}

/// Add `X-Total-Count` and an RFC 5988 `Link` header for a page
pub fn pagination<'b, T>(
    builder: &'b mut HttpResponseBuilder,
    req: &HttpRequest,
    page: &Page<T>,
) -> &'b mut HttpResponseBuilder {
    let link = link_header(
        req.path(),
        req.query_string(),
        page.page,
        page.size,
        page.total_pages(),
    );

    builder
        .insert_header((TOTAL_COUNT_HEADER, page.total.to_string()))
        .insert_header(("Link", link))
}

/// Build the `Link` header value
///
/// Query parameters other than `page` and `size` (e.g. `sort`, `query`) are kept.
pub fn link_header(path: &str, query: &str, page: u32, size: u32, total_pages: u32) -> String {
    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| {
            let key = pair.split('=').next().unwrap_or("");
            key != "page" && key != "size"
        })
        .collect();

    let link = |target: u32, rel: &str| {
        let mut params = kept.clone();
        let page_param = format!("page={}", target);
        let size_param = format!("size={}", size);
        params.push(&page_param);
        params.push(&size_param);
        format!("<{}?{}>; rel=\"{}\"", path, params.join("&"), rel)
    };

    let last_page = total_pages.saturating_sub(1);
    let mut links = Vec::with_capacity(4);
    if page < last_page {
        links.push(link(page + 1, "next"));
    }
    if page > 0 {
        links.push(link(page - 1, "prev"));
    }
    links.push(link(last_page, "last"));
    links.push(link(0, "first"));

    links.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::HttpResponse;

    #[test]
    fn test_link_header_middle_page() {
        let link = link_header("/api/animes", "page=1&size=10&sort=title,asc", 1, 10, 3);
        assert_eq!(
            link,
            "</api/animes?sort=title,asc&page=2&size=10>; rel=\"next\",\
             </api/animes?sort=title,asc&page=0&size=10>; rel=\"prev\",\
             </api/animes?sort=title,asc&page=2&size=10>; rel=\"last\",\
             </api/animes?sort=title,asc&page=0&size=10>; rel=\"first\""
        );
    }

    #[test]
    fn test_link_header_first_page_has_no_prev() {
        let link = link_header("/api/genres", "", 0, 20, 2);
        assert!(link.contains("rel=\"next\""));
        assert!(!link.contains("rel=\"prev\""));
    }

    #[test]
    fn test_link_header_last_page_has_no_next() {
        let link = link_header("/api/genres", "size=20&page=1", 1, 20, 2);
        assert!(!link.contains("rel=\"next\""));
        assert!(link.contains("</api/genres?page=0&size=20>; rel=\"prev\""));
    }

    #[test]
    fn test_link_header_empty_result() {
        let link = link_header("/api/_search/reviews", "query=great", 0, 20, 0);
        assert_eq!(
            link,
            "</api/_search/reviews?query=great&page=0&size=20>; rel=\"last\",\
             </api/_search/reviews?query=great&page=0&size=20>; rel=\"first\""
        );
    }

    #[test]
    fn test_entity_alerts() {
        let response = creation_alert(&mut HttpResponse::Created(), "watchHistory", "12").finish();
        assert_eq!(
            response.headers().get(ALERT_HEADER).unwrap(),
            "animeCatalogApp.watchHistory.created"
        );
        assert_eq!(response.headers().get(PARAMS_HEADER).unwrap(), "12");

        let response = deletion_alert(&mut HttpResponse::NoContent(), "anime", "3").finish();
        assert_eq!(
            response.headers().get(ALERT_HEADER).unwrap(),
            "animeCatalogApp.anime.deleted"
        );
    }
}
