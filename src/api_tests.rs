//! Tests for the Xtream catalog client

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;

    use flate2::write::GzEncoder;
    use flate2::Compression;

    use crate::api::*;
    use crate::config::ProviderSettings;
    use crate::epg::EpgOptions;
    use crate::error::FetchError;
    use crate::models::{EpgChannelId, StreamFormat};
    use crate::transport::testing::ScriptedTransport;

    const CATEGORIES: &str = r#"[
        {"category_id": "1", "category_name": "News", "parent_id": 0},
        {"category_id": "2", "category_name": "Sports"}
    ]"#;

    fn settings() -> ProviderSettings {
        ProviderSettings {
            server: "iptv.example".to_string(),
            port: 8080,
            username: "john".to_string(),
            password: "s3cr&t".to_string(),
            ..ProviderSettings::default()
        }
    }

    fn client(transport: ScriptedTransport) -> (XtreamClient<Arc<ScriptedTransport>>, Arc<ScriptedTransport>) {
        let transport = Arc::new(transport);
        (XtreamClient::with_transport(settings(), Arc::clone(&transport)), transport)
    }

    fn client_with(settings: ProviderSettings) -> XtreamClient<ScriptedTransport> {
        XtreamClient::with_transport(settings, ScriptedTransport::new())
    }

    #[test]
    fn test_fetch_categories() {
        let (c, t) = client(ScriptedTransport::new().respond(200, CATEGORIES));
        let categories = c.fetch_categories().unwrap();

        assert_eq!(categories.len(), 2);
        assert_eq!(categories[0].id, 1);
        assert_eq!(categories[0].name, "News");
        assert_eq!(categories[1].name, "Sports");
        assert_eq!(
            t.urls()[0],
            "http://iptv.example:8080/player_api.php?username=john&password=s3cr%26t&action=get_live_categories"
        );
    }

    #[test]
    fn test_categories_without_valid_id_skipped() {
        let body = r#"[{"category_name": "Orphan"}, {"category_id": "abc"}, {"category_id": 0},
                       {"category_id": -3}, {"category_id": 9, "category_name": "Kept"}]"#;
        let (c, _) = client(ScriptedTransport::new().respond(200, body));
        let categories = c.fetch_categories().unwrap();
        assert_eq!(categories.len(), 1);
        assert_eq!(categories[0].id, 9);
    }

    #[test]
    fn test_categories_error_kinds() {
        let (c, _) = client(ScriptedTransport::new().respond(200, r#"{"user_info": {"auth": 0}}"#));
        assert!(matches!(c.fetch_categories(), Err(FetchError::ShapeMismatch(_))));

        let (c, _) = client(ScriptedTransport::new().respond(200, "[]"));
        assert!(matches!(c.fetch_categories(), Err(FetchError::EmptyResult(_))));

        let (c, _) = client(ScriptedTransport::new().respond(403, "Forbidden"));
        match c.fetch_categories() {
            Err(FetchError::Transport(line)) => assert!(line.contains("403")),
            other => panic!("expected transport error, got {:?}", other),
        }

        let (c, _) = client(ScriptedTransport::new().fail("connection refused"));
        assert!(c.fetch_categories().unwrap_err().is_transport());
    }

    #[test]
    fn test_fetch_streams_mixed_encodings() {
        let body = r#"[
            {"num": 1, "name": "CNN é", "stream_id": 101, "stream_icon": "http:\/\/img\/cnn.png", "category_id": "1"},
            {"num": "2", "name": "BBC", "stream_id": "102", "stream_icon": "", "category_id": null},
            {"num": 3, "name": "Duplicate", "stream_id": 101},
            {"name": "No id"}
        ]"#;
        let (c, t) = client(ScriptedTransport::new().respond(200, body));
        let streams = c.fetch_streams(1).unwrap();

        assert_eq!(streams.len(), 2);
        assert_eq!(streams[0].id, 101);
        assert_eq!(streams[0].name, "CNN é");
        assert_eq!(streams[0].icon, "http://img/cnn.png");
        assert_eq!(streams[0].category_id, 1);
        assert_eq!(streams[1].number, 2);
        assert_eq!(streams[1].category_id, 0);
        assert!(t.urls()[0].ends_with("&action=get_live_streams&category_id=1"));
    }

    #[test]
    fn test_fetch_streams_without_category_filter() {
        let (c, t) = client(ScriptedTransport::new().respond(200, r#"[{"stream_id": 5}]"#));
        c.fetch_streams(0).unwrap();
        assert!(t.urls()[0].ends_with("&action=get_live_streams"));
    }

    #[test]
    fn test_catalog_bulk() {
        let streams = r#"[{"stream_id": 1, "category_id": "1"}, {"stream_id": 2, "category_id": "2"}]"#;
        let (c, t) = client(
            ScriptedTransport::new()
                .respond(200, CATEGORIES)
                .respond(200, streams),
        );

        let catalog = c.fetch_all_live_streams().unwrap();
        assert_eq!(catalog.categories.len(), 2);
        assert_eq!(catalog.streams.len(), 2);
        assert_eq!(t.request_count(), 2);
    }

    #[test]
    fn test_catalog_falls_back_per_category_in_order() {
        let (c, t) = client(
            ScriptedTransport::new()
                .respond(200, CATEGORIES)
                .respond(500, "")
                .respond(200, r#"[{"stream_id": 10, "category_id": 1}, {"stream_id": 11, "category_id": 1}]"#)
                .respond(200, r#"[{"stream_id": 11, "category_id": 2}, {"stream_id": 20, "category_id": 2}]"#),
        );

        let catalog = c.fetch_all_live_streams().unwrap();
        let ids: Vec<u32> = catalog.streams.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![10, 11, 20]);

        let urls = t.urls();
        assert_eq!(urls.len(), 4);
        assert!(urls[2].ends_with("&category_id=1"));
        assert!(urls[3].ends_with("&category_id=2"));
    }

    #[test]
    fn test_catalog_fallback_failure_aborts() {
        let (c, t) = client(
            ScriptedTransport::new()
                .respond(200, CATEGORIES)
                .respond(200, "{}")
                .respond(200, r#"[{"stream_id": 10}]"#)
                .respond(200, "[]"),
        );

        assert!(matches!(
            c.fetch_all_live_streams(),
            Err(FetchError::EmptyResult(_))
        ));
        assert_eq!(t.request_count(), 4);
    }

    #[test]
    fn test_catalog_needs_categories() {
        let (c, t) = client(ScriptedTransport::new().fail("timed out"));
        assert!(matches!(
            c.fetch_all_live_streams(),
            Err(FetchError::Transport(_))
        ));
        assert_eq!(t.request_count(), 1);
    }

    #[test]
    fn test_base_url_port_rules() {
        let mut s = settings();
        assert_eq!(client_with(s.clone()).base_url().as_deref(), Some("http://iptv.example:8080"));

        s.port = 0;
        assert_eq!(client_with(s.clone()).base_url().as_deref(), Some("http://iptv.example"));

        s.server = "https://secure.example/".to_string();
        s.port = 443;
        assert_eq!(client_with(s.clone()).base_url().as_deref(), Some("https://secure.example:443"));

        s.server = "http://host.example:25461".to_string();
        assert_eq!(client_with(s.clone()).base_url().as_deref(), Some("http://host.example:25461"));

        s.server = "  ".to_string();
        assert_eq!(client_with(s).base_url(), None);
    }

    #[test]
    fn test_build_live_stream_url() {
        let mut s = settings();
        s.username = "user name".to_string();
        let c = client_with(s);

        assert_eq!(
            c.build_live_stream_url(42, StreamFormat::Ts).as_deref(),
            Some("http://iptv.example:8080/live/user%20name/s3cr%26t/42.ts")
        );
        assert_eq!(
            c.build_live_stream_url(42, StreamFormat::Hls).as_deref(),
            Some("http://iptv.example:8080/live/user%20name/s3cr%26t/42.m3u8")
        );
        assert_eq!(c.build_live_stream_url(0, StreamFormat::Ts), None);
    }

    #[test]
    fn test_user_agent() {
        let mut s = settings();
        assert_eq!(client_with(s.clone()).user_agent(), None);

        s.enable_user_agent_spoofing = true;
        assert_eq!(client_with(s.clone()).user_agent(), Some(DEFAULT_USER_AGENT));

        s.custom_user_agent = "VLC/3.0".to_string();
        let (c, t) = {
            let t = Arc::new(ScriptedTransport::new().respond(200, CATEGORIES));
            (XtreamClient::with_transport(s, Arc::clone(&t)), t)
        };
        assert_eq!(c.user_agent(), Some("VLC/3.0"));
        c.fetch_categories().unwrap();
        assert_eq!(t.requests()[0].header_value("user-agent"), Some("VLC/3.0"));
    }

    #[test]
    fn test_redact_credentials() {
        assert_eq!(
            redact_credentials("http://h/player_api.php?username=john&password=pw&action=x"),
            "http://h/player_api.php?username=***&password=***&action=x"
        );
        assert_eq!(
            redact_credentials("http://h/xmltv.php?username=&password=secret"),
            "http://h/xmltv.php?username=***&password=***"
        );
        assert_eq!(redact_credentials("http://h/live/1.ts"), "http://h/live/1.ts");
    }

    #[test]
    fn test_connection_validates_settings_first() {
        let mut s = settings();
        s.password.clear();
        let t = Arc::new(ScriptedTransport::new());
        let c = XtreamClient::with_transport(s, Arc::clone(&t));

        assert_eq!(
            c.test_connection(),
            Err(FetchError::InvalidSettings("Password is empty".to_string()))
        );
        assert_eq!(t.request_count(), 0);
    }

    #[test]
    fn test_connection_status() {
        let (c, t) = client(
            ScriptedTransport::new()
                .respond(200, r#"{"user_info": {"auth": 1}, "server_info": {}}"#)
                .respond(401, ""),
        );
        assert_eq!(c.test_connection().unwrap(), "HTTP/1.1 200");
        assert!(matches!(c.test_connection(), Err(FetchError::Transport(_))));
        assert_eq!(
            t.urls()[0],
            "http://iptv.example:8080/player_api.php?username=john&password=s3cr%26t"
        );
    }

    #[test]
    fn test_connection_needs_signature_or_ok_status() {
        let (c, _) = client(
            ScriptedTransport::new()
                .respond(204, "")
                .respond(202, r#"{"User_Info": {"auth": 1}}"#)
                .respond(201, "welcome"),
        );
        assert_eq!(
            c.test_connection(),
            Err(FetchError::ShapeMismatch("HTTP/1.1 204".to_string()))
        );
        assert_eq!(c.test_connection().unwrap(), "HTTP/1.1 202");
        assert_eq!(c.test_connection().unwrap(), "HTTP/1.1 201");
    }

    #[test]
    fn test_fetch_xmltv_checks_body() {
        let (c, t) = client(
            ScriptedTransport::new()
                .respond(200, "")
                .respond(200, "<html>maintenance</html>")
                .respond(200, "<?xml version=\"1.0\"?><tv></tv>"),
        );
        assert!(matches!(c.fetch_xmltv(), Err(FetchError::EmptyResult(_))));
        assert!(matches!(c.fetch_xmltv(), Err(FetchError::ShapeMismatch(_))));
        assert!(c.fetch_xmltv().is_ok());
        assert_eq!(
            t.urls()[0],
            "http://iptv.example:8080/xmltv.php?username=john&password=s3cr%26t"
        );
    }

    #[test]
    fn test_fetch_epg_gzip() {
        let xml = r#"<?xml version="1.0"?>
<tv>
  <channel id="cnn.us"><display-name>CNN</display-name></channel>
  <programme channel="cnn.us" start="20260121120000 +0000" stop="20260121130000 +0000">
    <title>Newsroom</title>
  </programme>
</tv>"#;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(xml.as_bytes()).unwrap();
        let gz = encoder.finish().unwrap();

        let (c, _) = client(
            ScriptedTransport::new()
                .respond(200, r#"[{"stream_id": 101, "name": "cnn"}]"#)
                .respond_bytes(200, gz),
        );
        let streams = c.fetch_streams(0).unwrap();
        let epg = c.fetch_epg(&streams, &EpgOptions::default()).unwrap();

        assert_eq!(epg.len(), 1);
        assert_eq!(epg[0].id, EpgChannelId::Stream(101));
        assert_eq!(epg[0].entries.len(), 1);
    }
}
