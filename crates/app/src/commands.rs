use std::error::Error;
use std::future::Future;
use std::pin::Pin;

use mcq_core::model::{Institute, InstituteId, OptionIndex, SavedQuestion, search};
use mcq_core::session::{AnswerFeedback, AutoAdvance, FeedbackTone, QuickModeConfig};
use services::{AppServices, ViewerCommand, ViewerScope, ViewerService, ViewerSession};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use crate::{Command, PracticeTarget};

type CommandResult = Result<(), Box<dyn Error>>;

pub(crate) async fn execute(app: &AppServices, command: Command) -> CommandResult {
    match command {
        Command::Institutes => list_institutes(app).await,
        Command::Tests { coaching } => list_tests(app, &coaching).await,
        Command::Practice {
            coaching,
            target,
            quick,
            question,
        } => practice(app, &coaching, target, quick, question).await,
        Command::Progress { coaching } => show_progress(app, &coaching).await,
        Command::Toggle {
            coaching,
            test,
            section,
        } => {
            let completed = app
                .progress()
                .toggle_section_completion(&coaching, &test, &section)
                .await?;
            let state = if completed { "completed" } else { "not completed" };
            println!("{coaching}/{test}/{section}: {state}");
            Ok(())
        }
        Command::Complete { coaching, test } => {
            app.progress().mark_test_complete(&coaching, &test).await?;
            println!("{coaching}/{test}: marked complete");
            Ok(())
        }
        Command::Uncomplete { coaching, test } => {
            app.progress().unmark_test_complete(&coaching, &test).await?;
            println!("{coaching}/{test}: marked incomplete");
            Ok(())
        }
        Command::Sync => {
            if app.auth().user_id().is_none() {
                println!("sign in with --user <uid> to sync progress");
                return Ok(());
            }
            let report = app.progress().initialize_progress_sync().await;
            println!(
                "synced {} sections and {} tests ({} failed)",
                report.sections_synced, report.tests_synced, report.failures
            );
            Ok(())
        }
        Command::Saved { search, all } => list_saved(app, search.as_deref(), all).await,
        Command::Notifications => list_notifications(app).await,
    }
}

async fn find_institute(app: &AppServices, coaching: &InstituteId) -> Result<Institute, Box<dyn Error>> {
    app.viewer()
        .institute(coaching)
        .await
        .ok_or_else(|| format!("unknown institute: {coaching}").into())
}

async fn list_institutes(app: &AppServices) -> CommandResult {
    let institutes = app.viewer().institutes().await;
    if institutes.is_empty() {
        println!("no institutes found");
    }
    for institute in institutes {
        println!(
            "{:<16} {} ({} tests)",
            institute.id(),
            institute.name(),
            institute.tests().len()
        );
    }
    Ok(())
}

async fn list_tests(app: &AppServices, coaching: &InstituteId) -> CommandResult {
    let institute = find_institute(app, coaching).await?;
    let progress = app.progress();
    for test in institute.tests() {
        let done = progress.is_test_complete_hybrid(coaching, &test.id).await;
        println!(
            "[{}] {:<12} {} ({} questions, {} marks, {} min)",
            if done { "x" } else { " " },
            test.id,
            test.title,
            test.question_count,
            test.marks,
            test.time_limit_minutes
        );
    }
    Ok(())
}

async fn show_progress(app: &AppServices, coaching: &InstituteId) -> CommandResult {
    let institute = find_institute(app, coaching).await?;
    let progress = app.progress();
    let total = institute.sections().len();
    for test in institute.tests() {
        let p = progress.test_section_progress(coaching, &test.id, total);
        println!(
            "{:<12} {:>3}% ({}/{})",
            test.id, p.percentage, p.completed, p.total
        );
    }
    let stats = progress.institute_stats(&institute);
    println!(
        "overall {}% ({}/{} cells, {} tests complete)",
        stats.overall_percentage, stats.completed_cells, stats.total_cells, stats.completed_tests
    );
    Ok(())
}

async fn list_saved(app: &AppServices, term: Option<&str>, all: bool) -> CommandResult {
    let saved = if all {
        app.saved().list_all_saved().await
    } else {
        app.saved().list_saved().await?
    };
    let saved: Vec<SavedQuestion> = match term {
        Some(term) => search(&saved, term),
        None => saved,
    };
    if saved.is_empty() {
        println!("no saved questions");
    }
    for q in saved {
        println!(
            "{} {} / {}: {}",
            q.data.saved_at.format("%Y-%m-%d"),
            q.data.institute_name.as_deref().unwrap_or(q.data.coaching_id.as_str()),
            q.data.test_name.as_deref().unwrap_or(q.data.test_id.as_str()),
            plain_text(&q.data.question_html)
        );
    }
    Ok(())
}

async fn list_notifications(app: &AppServices) -> CommandResult {
    let Some(user) = app.auth().user_id() else {
        println!("sign in with --user <uid> to see notifications");
        return Ok(());
    };
    let notifications = app.notifications();
    for n in notifications.all_for(&user).await {
        let marker = if n.data.read { " " } else { "*" };
        println!("{marker} [{}] {}: {}", n.data.kind, n.data.title, n.data.message);
        if !n.data.read {
            if let Err(err) = notifications.mark_as_read(&n.id).await {
                warn!(id = %n.id, error = %err, "notification not marked read");
            }
        }
    }
    Ok(())
}

//
// ─── PRACTICE ──────────────────────────────────────────────────────────────────
//

async fn practice(
    app: &AppServices,
    coaching: &InstituteId,
    target: PracticeTarget,
    quick: bool,
    question: Option<usize>,
) -> CommandResult {
    let institute = find_institute(app, coaching).await?;
    let viewer = app.viewer();
    let mut view = match &target {
        PracticeTarget::Test(test_id) => viewer.open_test(&institute, test_id).await,
        PracticeTarget::Section(section_id) => {
            viewer.open_section(&institute, section_id, question).await
        }
    };
    if quick {
        view.set_quick_mode(QuickModeConfig::enabled());
    }
    if view.session().is_empty() {
        println!("no questions available");
        return Ok(());
    }
    if let (PracticeTarget::Test(_), Some(n)) = (&target, question) {
        if let Err(err) = viewer.navigate(&mut view, ViewerCommand::Jump(n - 1)) {
            println!("{err}");
        }
    }

    println!("keys: a-d/1-4 answer, n/p move, s solution, g <n> go to, save, bookmark, q quit");
    render(&viewer, &mut view).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending: Option<Pin<Box<dyn Future<Output = AutoAdvance>>>> = None;
    loop {
        let input = match pending.as_mut() {
            Some(timer) => tokio::select! {
                ticket = timer => Input::Advance(ticket),
                line = lines.next_line() => Input::Line(line?),
            },
            None => Input::Line(lines.next_line().await?),
        };
        let line = match input {
            Input::Advance(ticket) => {
                pending = None;
                if viewer.apply_auto_advance(&mut view, ticket) {
                    render(&viewer, &mut view).await;
                }
                continue;
            }
            Input::Line(None) => break,
            Input::Line(Some(line)) => line,
        };
        let input = line.trim();
        match input {
            "q" | "quit" => break,
            "s" => {
                viewer.navigate(&mut view, ViewerCommand::ToggleSolution)?;
            }
            "save" => match viewer.save_current(&mut view).await {
                Ok(Some(outcome)) if outcome.is_new() => println!("saved"),
                Ok(Some(_)) => println!("already saved"),
                Ok(None) => {}
                Err(err) => println!("{err}"),
            },
            "bookmark" => match viewer.toggle_bookmark(&view)? {
                Some(true) => println!("bookmarked"),
                Some(false) => println!("bookmark removed"),
                None => {}
            },
            other if other.starts_with("g ") => {
                let jumped = other
                    .split_at(2)
                    .1
                    .trim()
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .map(|index| viewer.navigate(&mut view, ViewerCommand::Jump(index)));
                match jumped {
                    Some(Ok(_)) => {}
                    Some(Err(err)) => println!("{err}"),
                    None => println!("usage: g <question number>"),
                }
            }
            key => {
                let outcome = viewer.handle_key(&mut view, key);
                if outcome.command.is_none() {
                    continue;
                }
                if let Some(feedback) = outcome.feedback {
                    report_answer(&view, &feedback);
                    if let Some(ticket) = feedback.quick.and_then(|q| q.auto_advance) {
                        pending = Some(Box::pin(ViewerService::wait_auto_advance(ticket)));
                    }
                }
            }
        }
        render(&viewer, &mut view).await;
    }

    let score = view.session().score();
    if view.session().quick_mode().enabled {
        println!("score: {} correct, {} incorrect", score.correct, score.incorrect);
    }
    Ok(())
}

enum Input {
    Line(Option<String>),
    Advance(AutoAdvance),
}

async fn render(viewer: &ViewerService, view: &mut ViewerSession) {
    if let Some(request) = view.saved_check_request() {
        let check = viewer.check_saved(request).await;
        view.apply_saved_check(&check);
    }
    let session = view.session();
    let Some(question) = session.current_question() else {
        return;
    };
    let location = match view.scope() {
        ViewerScope::Test(id) => format!("test {id}"),
        ViewerScope::Section(id) => format!("section {}", view.institute().section_name(id)),
    };
    let saved = if view.current_saved() == Some(true) { " [saved]" } else { "" };
    println!();
    println!(
        "{location}: question {} of {}{saved}",
        session.current_index() + 1,
        session.len()
    );
    println!("{}", plain_text(question.question_html()));
    for option in OptionIndex::all() {
        let marker = if session.selected_option() == Some(option) { ">" } else { " " };
        println!("{marker} {}) {}", option.letter(), plain_text(question.option(option)));
    }
    if session.solution_visible() {
        println!("answer: {}", question.correct_option().letter());
        if let Some(solution) = question.solution_html() {
            println!("{}", plain_text(solution));
        }
    }
}

fn report_answer(view: &ViewerSession, feedback: &AnswerFeedback) {
    let verdict = if feedback.correct {
        "correct".to_owned()
    } else {
        view.session()
            .current_question()
            .map_or_else(
                || "incorrect".to_owned(),
                |q| format!("incorrect, answer is {}", q.correct_option().letter()),
            )
    };
    match feedback.quick.as_ref().and_then(|q| q.tone) {
        Some(tone) => println!("{verdict} {}", tone_label(tone)),
        None => println!("{verdict}"),
    }
}

/// Terminal stand-in for the answer tone.
fn tone_label(tone: FeedbackTone) -> String {
    let (start, end) = tone.frequencies_hz();
    format!("(tone {start}->{end} Hz, {} ms)", tone.duration().as_millis())
}

/// Strip markup for terminal output.
fn plain_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .trim()
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_drops_tags_and_entities() {
        assert_eq!(plain_text("<p>2 &lt; 3&nbsp;<b>true</b></p>"), "2 < 3 true");
        assert_eq!(plain_text("no markup"), "no markup");
    }

    #[test]
    fn tone_label_shows_the_sweep() {
        assert_eq!(tone_label(FeedbackTone::Correct), "(tone 600->800 Hz, 150 ms)");
        assert_eq!(tone_label(FeedbackTone::Incorrect), "(tone 200->150 Hz, 200 ms)");
    }
}
