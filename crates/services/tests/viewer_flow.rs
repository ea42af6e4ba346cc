use std::sync::Arc;
use std::time::Duration;

use mcq_core::model::{
    Institute, InstituteId, OptionIndex, Question, QuestionId, SectionEntry, SectionId, TestId,
    TestInfo, UserId,
};
use mcq_core::session::QuickModeConfig;
use mcq_core::time::fixed_clock;
use services::{
    AppServices, UserAccount, ViewerCommand, ViewerError, ViewerScope, ViewerService,
};
use storage::content::StaticContent;
use storage::repository::Storage;

fn question(n: usize, section: &str) -> Question {
    Question::new(
        QuestionId::new(format!("q{n}")),
        TestId::new("t1"),
        format!("Question {n}"),
        ["a".into(), "b".into(), "c".into(), "d".into()],
        OptionIndex::new(1).unwrap(),
    )
    .with_section(Some(SectionId::new(section)))
}

fn institute() -> Institute {
    Institute::new(
        InstituteId::new("inst1"),
        "Institute One",
        None,
        "inst1",
        vec![TestInfo {
            id: TestId::new("t1"),
            title: "Mock Test 1".into(),
            question_count: 4,
            marks: 4.0,
            time_limit_minutes: 10,
        }],
        vec![SectionEntry {
            id: SectionId::new("s1"),
            name: "Algebra".into(),
        }],
    )
}

fn app() -> AppServices {
    let section: Vec<Question> = (1..=10).map(|n| question(n, "s1")).collect();
    let test = vec![
        question(1, "s1"),
        question(2, "s1"),
        question(3, "s2"),
        question(4, "s2"),
    ];
    let content = StaticContent::default()
        .with_institute(institute())
        .with_section_questions("inst1", SectionId::new("s1"), section)
        .with_test_questions("inst1", TestId::new("t1"), test);
    let storage = Storage::in_memory()
        .with_clock(fixed_clock())
        .with_content(Arc::new(content));
    AppServices::from_storage(storage, fixed_clock())
}

#[tokio::test]
async fn section_resumes_at_last_viewed_question() {
    let app = app();
    let viewer = app.viewer();
    let inst = viewer.institute(&InstituteId::new("inst1")).await.unwrap();
    let s1 = SectionId::new("s1");

    app.storage().local.save_last_viewed(inst.id(), &s1, 7).unwrap();
    let view = viewer.open_section(&inst, &s1, None).await;
    assert_eq!(view.session().current_index(), 7);
    assert_eq!(view.scope(), &ViewerScope::Section(s1.clone()));

    let view = viewer.open_section(&inst, &s1, Some(3)).await;
    assert_eq!(view.session().current_index(), 2);
}

#[tokio::test]
async fn navigation_persists_the_section_pointer() {
    let app = app();
    let viewer = app.viewer();
    let inst = institute();
    let s1 = SectionId::new("s1");
    let mut view = viewer.open_section(&inst, &s1, None).await;

    assert!(viewer.navigate(&mut view, ViewerCommand::Next).unwrap().moved);
    assert!(viewer.handle_key(&mut view, "n").moved);
    assert_eq!(app.storage().local.last_viewed(inst.id(), &s1), Some(2));

    viewer.navigate(&mut view, ViewerCommand::Jump(9)).unwrap();
    assert!(!viewer.navigate(&mut view, ViewerCommand::Next).unwrap().moved);
    assert_eq!(app.storage().local.last_viewed(inst.id(), &s1), Some(9));

    let err = viewer
        .navigate(&mut view, ViewerCommand::Jump(10))
        .unwrap_err();
    assert!(matches!(err, ViewerError::Session(_)));
    assert_eq!(view.session().current_index(), 9);
}

#[tokio::test]
async fn test_sessions_do_not_touch_pointers() {
    let app = app();
    let viewer = app.viewer();
    let inst = institute();
    let mut view = viewer.open_test(&inst, &TestId::new("t1")).await;
    assert_eq!(view.session().len(), 4);

    viewer
        .navigate(&mut view, ViewerCommand::Section(SectionId::new("s2")))
        .unwrap();
    assert_eq!(view.session().current_index(), 2);
    assert!(app.storage().local.last_viewed_pointers().is_empty());
}

#[tokio::test]
async fn missing_content_opens_an_empty_session() {
    let app = app();
    let viewer = app.viewer();
    let inst = institute();

    let mut view = viewer.open_test(&inst, &TestId::new("missing")).await;
    assert!(view.session().is_empty());
    assert!(!viewer.navigate(&mut view, ViewerCommand::Next).unwrap().moved);
    assert!(!viewer.navigate(&mut view, ViewerCommand::Prev).unwrap().moved);
    assert!(view.saved_check_request().is_none());

    let view = viewer
        .open_section(&inst, &SectionId::new("missing"), Some(4))
        .await;
    assert!(view.session().is_empty());
}

#[tokio::test]
async fn answer_keys_are_locked_after_a_selection() {
    let app = app();
    let viewer = app.viewer();
    let mut view = viewer.open_test(&institute(), &TestId::new("t1")).await;

    let outcome = viewer.handle_key(&mut view, "2");
    assert!(outcome.feedback.is_some());
    assert!(viewer.handle_key(&mut view, "3").feedback.is_none());
    assert!(viewer.handle_key(&mut view, "c").command.is_none());
    assert_eq!(view.session().selected_option(), OptionIndex::new(2).ok());

    let next = viewer.handle_key(&mut view, "ArrowRight");
    assert!(next.prevent_default && next.moved);
    assert_eq!(view.session().selected_option(), None);
}

#[tokio::test(start_paused = true)]
async fn quick_mode_auto_advances_after_the_delay() {
    let app = app();
    let viewer = app.viewer();
    let mut view = viewer.open_section(&institute(), &SectionId::new("s1"), None).await;
    view.set_quick_mode(QuickModeConfig {
        auto_next_delay: Duration::from_millis(500),
        ..QuickModeConfig::enabled()
    });

    let feedback = viewer
        .navigate(&mut view, ViewerCommand::Select(OptionIndex::new(1).unwrap()))
        .unwrap()
        .feedback
        .unwrap();
    assert!(feedback.correct);
    let ticket = feedback.quick.and_then(|q| q.auto_advance).unwrap();

    let started = tokio::time::Instant::now();
    let ticket = ViewerService::wait_auto_advance(ticket).await;
    assert!(started.elapsed() >= Duration::from_millis(500));
    assert!(viewer.apply_auto_advance(&mut view, ticket));
    assert_eq!(view.session().current_index(), 1);
    assert_eq!(view.session().score().correct, 1);
    assert_eq!(
        app.storage()
            .local
            .last_viewed(&InstituteId::new("inst1"), &SectionId::new("s1")),
        Some(1)
    );

    // A ticket from a question the user already left does nothing.
    assert!(!viewer.apply_auto_advance(&mut view, ticket));
    assert_eq!(view.session().current_index(), 1);
}

#[tokio::test(start_paused = true)]
async fn navigating_during_the_delay_cancels_auto_advance() {
    let app = app();
    let viewer = app.viewer();
    let mut view = viewer.open_section(&institute(), &SectionId::new("s1"), None).await;
    view.set_quick_mode(QuickModeConfig::enabled());

    let ticket = viewer
        .navigate(&mut view, ViewerCommand::Select(OptionIndex::new(2).unwrap()))
        .unwrap()
        .feedback
        .and_then(|f| f.quick)
        .and_then(|q| q.auto_advance)
        .unwrap();

    let timer = tokio::spawn(ViewerService::wait_auto_advance(ticket));
    viewer.navigate(&mut view, ViewerCommand::Jump(5)).unwrap();
    let ticket = timer.await.unwrap();

    assert!(!viewer.apply_auto_advance(&mut view, ticket));
    assert_eq!(view.session().current_index(), 5);
    assert_eq!(
        app.storage()
            .local
            .last_viewed(&InstituteId::new("inst1"), &SectionId::new("s1")),
        Some(5)
    );
}

#[tokio::test]
async fn stale_saved_checks_are_discarded() {
    let app = app();
    app.sign_in(UserAccount::new(UserId::new("u1"))).await;
    let viewer = app.viewer();
    let mut view = viewer.open_test(&institute(), &TestId::new("t1")).await;

    let outcome = viewer.save_current(&mut view).await.unwrap().unwrap();
    assert!(outcome.is_new());
    assert_eq!(outcome.question().data.test_name.as_deref(), Some("Mock Test 1"));
    assert_eq!(outcome.question().data.section_name.as_deref(), Some("Algebra"));
    assert_eq!(view.current_saved(), Some(true));

    let request = view.saved_check_request().unwrap();
    let check = viewer.check_saved(request).await;
    assert!(check.saved);

    viewer.navigate(&mut view, ViewerCommand::Next).unwrap();
    assert_eq!(view.current_saved(), None);
    assert!(!view.apply_saved_check(&check));
    assert_eq!(view.current_saved(), None);

    let fresh = viewer.check_saved(view.saved_check_request().unwrap()).await;
    assert!(view.apply_saved_check(&fresh));
    assert_eq!(view.current_saved(), Some(false));
}

#[tokio::test]
async fn bookmarks_toggle_on_the_current_question() {
    let app = app();
    let viewer = app.viewer();
    let view = viewer.open_test(&institute(), &TestId::new("t1")).await;

    assert_eq!(viewer.toggle_bookmark(&view).unwrap(), Some(true));
    assert_eq!(app.storage().local.bookmarks().len(), 1);
    assert_eq!(viewer.toggle_bookmark(&view).unwrap(), Some(false));
    assert!(app.storage().local.bookmarks().is_empty());
}
