//! Article (fallback) adapter.
//!
//! Always matches. Collects the evidence the entity resolver needs: meta
//! description, JSON-LD organisation names and the subject's own website.

use neolabs_shared::DomainPolicy;
use scraper::Html;
use url::Url;

use super::{ArticleEvidence, PageAdapter, PageExtraction};
use crate::extract::{external_website, json_ld_organizations, meta_description};

/// Fallback adapter for news stories and blog posts.
pub struct ArticleAdapter {
    policy: DomainPolicy,
}

impl ArticleAdapter {
    pub fn new(policy: DomainPolicy) -> Self {
        Self { policy }
    }
}

impl PageAdapter for ArticleAdapter {
    fn detect(&self, _url: &Url) -> bool {
        true
    }

    fn extract(&self, doc: &Html, url: &Url) -> PageExtraction {
        PageExtraction::Article(ArticleEvidence {
            meta_description: meta_description(doc),
            json_ld_names: json_ld_organizations(doc),
            website_url: external_website(doc, url, &self.policy),
        })
    }

    fn name(&self) -> &str {
        "article"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gathers_evidence() {
        let adapter = ArticleAdapter::new(DomainPolicy::new(vec!["techcrunch.com".into()], vec![]));
        let url = Url::parse("https://techcrunch.com/2025/03/01/reka-raises/").unwrap();
        let doc = Html::parse_document(
            r#"<html><head>
                 <meta name="description" content="Reka raises a seed round">
                 <script type="application/ld+json">{"@type":"NewsArticle",
                   "about":{"@type":"Organization","name":"Reka"}}</script>
               </head><body>
                 <a href="https://reka.ai">Reka website</a>
               </body></html>"#,
        );

        assert_eq!(
            adapter.extract(&doc, &url),
            PageExtraction::Article(ArticleEvidence {
                meta_description: Some("Reka raises a seed round".into()),
                json_ld_names: vec!["Reka".into()],
                website_url: Some("https://reka.ai/".into()),
            })
        );
    }
}
