use std::path::{Path, PathBuf};

use waza_adapters::{FixtureJudoApi, JudoApi};
use waza_core::{extract, ScoreGroup};

fn fixture_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../fixtures/ijf")
        .canonicalize()
        .expect("fixture root")
}

#[tokio::test]
async fn recorded_competition_list_normalizes() {
    let api = FixtureJudoApi::from_dir(fixture_root());
    let comps = api.competitions().await.expect("competitions");

    let ids: Vec<_> = comps.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![2653, 2700, 1900]);
    assert_eq!(comps[0].event_type, "prime");
    assert_eq!(comps[1].year, Some(2024));
    assert_eq!(comps[2].event_type, "grand-prix");
    assert_eq!(comps[2].location, "Tbilisi, Georgia");
}

#[tokio::test]
async fn recorded_hierarchy_walks_down_to_techniques() {
    let api = FixtureJudoApi::from_dir(fixture_root());

    let categories = api.categories(2653).await.expect("categories");
    assert_eq!(categories.len(), 2);
    assert_eq!(categories[0].gender, "m");
    assert!(api.categories(1900).await.expect("none").is_empty());

    let contests = api.contests(2653, "1").await.expect("contests");
    assert_eq!(contests.len(), 2);
    assert_eq!(contests[0].competitors.len(), 2);

    let detail = api
        .contest_detail(2653, &contests[0].contest_code)
        .await
        .expect("detail")
        .expect("present");
    let techniques = extract(&detail);
    let tuples: Vec<_> = techniques
        .iter()
        .map(|t| (t.technique_name.as_str(), t.score, t.side.as_str()))
        .collect();
    assert_eq!(tuples, vec![("ko-soto-gari", 7, "Right"), ("seoi-nage", 10, "Left")]);
    assert!(techniques
        .iter()
        .all(|t| t.opponent_id.as_deref() == Some("102")));
}

#[tokio::test]
async fn recorded_awasete_ippon_hold_survives() {
    let api = FixtureJudoApi::from_dir(fixture_root());
    let detail = api
        .contest_detail(2700, "gs2024_w_0048_0001")
        .await
        .expect("detail")
        .expect("present");
    assert_eq!(detail.competition_id, 2700);

    let techniques = extract(&detail);
    assert_eq!(techniques.len(), 2);
    assert_eq!(techniques[1].technique_name, "yoko-shiho-gatame");
    assert_eq!(techniques[1].score_group, ScoreGroup::Ippon);
    assert_eq!(techniques[1].technique_category, "osaekomi-waza");
    assert_eq!(techniques[1].opponent_name.as_deref(), Some("TSUNODA Natsumi"));
}

#[tokio::test]
async fn recorded_profiles() {
    let api = FixtureJudoApi::from_dir(fixture_root());
    let profile = api
        .competitor_info("102")
        .await
        .expect("info")
        .expect("present");
    assert_eq!(profile.name, "LOMBARDO Manuel");
    assert_eq!(profile.height, Some(178));
    assert_eq!(profile.country, "ITA");
    assert!(api.competitor_info("999").await.expect("info").is_none());
    assert_eq!(api.profile_requests(), 2);
}
