//! Response engine integration tests

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{ScriptedBackend, ScriptedChat, ScriptedTalkingHead, avatar_rig, synthesizer};
use idms_assistant::{APOLOGY, AvatarMode, AvatarState, ModeFlags};

const GST_ANSWER: &str = "GST is the Goods and Services Tax. In IDMS, GST settings live under the GST Master.";

#[tokio::test(start_paused = true)]
async fn test_gst_question_animated_turn() {
    let chat = ScriptedChat::answering(GST_ANSWER);
    let voice = ScriptedBackend::working("premium");
    let service = ScriptedTalkingHead::ready("https://cdn.example/gst.mp4");
    let rig = avatar_rig(Some(service), Duration::from_secs(4));
    let engine = common::engine(
        Arc::clone(&chat),
        synthesizer(&[voice.clone()]),
        rig.presenter.clone(),
    );

    let turn = engine.process("What is GST?").await;

    assert_eq!(turn.input_text, "What is GST?");
    assert_eq!(turn.response_text, GST_ANSWER);
    assert_eq!(turn.detected_language, "en");
    assert_eq!(turn.avatar_mode, AvatarMode::Animated);
    assert_eq!(turn.avatar_url.as_deref(), Some("https://cdn.example/gst.mp4"));
    assert!(turn.speech_succeeded);
    assert_eq!(voice.texts(), vec![GST_ANSWER]);

    let prompts = chat.prompts.lock().unwrap().clone();
    assert!(prompts[0].0.contains("IDMS ERP"));
    assert_eq!(prompts[0].1, "What is GST?");

    // Animation still playing until settled
    assert_eq!(rig.presenter.state(), AvatarState::Talking);
    engine.settle().await;
    assert_eq!(rig.presenter.state(), AvatarState::Idle);
    assert_eq!(rig.display.shown_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_chat_failure_speaks_apology() {
    let chat = ScriptedChat::failing();
    let voice = ScriptedBackend::working("premium");
    let rig = avatar_rig(None, Duration::from_secs(1));
    let engine = common::engine(chat, synthesizer(&[voice.clone()]), rig.presenter.clone())
        .with_modes(ModeFlags {
            avatar: AvatarMode::Static,
            multilingual: false,
        });

    let turn = engine.process("What is GST?").await;

    assert_eq!(turn.response_text, APOLOGY);
    assert_eq!(voice.texts(), vec![APOLOGY]);
    assert_eq!(turn.avatar_mode, AvatarMode::Static);
    assert!(turn.avatar_path.is_some());
    assert_eq!(rig.presenter.state(), AvatarState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_speech_failure_is_reported_not_fatal() {
    let chat = ScriptedChat::answering(GST_ANSWER);
    let voice = ScriptedBackend::failing("premium");
    let rig = avatar_rig(None, Duration::from_secs(1));
    let engine = common::engine(chat, synthesizer(&[voice.clone()]), rig.presenter.clone());

    let turn = engine.process("What is GST?").await;

    assert!(!turn.speech_succeeded);
    assert_eq!(turn.response_text, GST_ANSWER);
}

#[tokio::test(start_paused = true)]
async fn test_multilingual_hindi_routes_to_multilingual_backend() {
    let chat = ScriptedChat::answering("जीएसटी वस्तु एवं सेवा कर है।");
    let premium = ScriptedBackend::working("premium");
    let online = ScriptedBackend::working("online").multilingual();
    let rig = avatar_rig(None, Duration::from_secs(1));
    let engine = common::engine(
        chat,
        synthesizer(&[premium.clone(), online.clone()]),
        rig.presenter.clone(),
    )
    .with_modes(ModeFlags {
        avatar: AvatarMode::None,
        multilingual: true,
    });

    let turn = engine.process("जीएसटी क्या है?").await;

    assert_eq!(turn.detected_language, "hi");
    assert_eq!(premium.calls(), 0);
    assert_eq!(online.languages(), vec!["hi"]);
}

#[tokio::test(start_paused = true)]
async fn test_monolingual_mode_ignores_input_language() {
    let chat = ScriptedChat::answering("GST answer");
    let premium = ScriptedBackend::working("premium");
    let rig = avatar_rig(None, Duration::from_secs(1));
    let engine = common::engine(chat, synthesizer(&[premium.clone()]), rig.presenter.clone())
        .with_modes(ModeFlags {
            avatar: AvatarMode::None,
            multilingual: false,
        });

    let turn = engine.process("जीएसटी क्या है?").await;

    assert_eq!(turn.detected_language, "en");
    assert_eq!(premium.languages(), vec!["en"]);
}

#[tokio::test(start_paused = true)]
async fn test_new_turn_supersedes_running_animation() {
    let chat = ScriptedChat::answering(GST_ANSWER);
    let voice = ScriptedBackend::working("premium");
    let service = ScriptedTalkingHead::ready("https://cdn.example/first.mp4");
    let rig = avatar_rig(Some(Arc::clone(&service)), Duration::from_secs(60));
    let engine = common::engine(
        Arc::clone(&chat),
        synthesizer(&[voice.clone()]),
        rig.presenter.clone(),
    );

    let first = engine.process("What is GST?").await;
    assert_eq!(first.avatar_mode, AvatarMode::Animated);

    // Let the animation start playing before the next question arrives
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(rig.player.played.lock().unwrap().len(), 1);
    assert!(rig.presenter.is_talking());

    // Second job never renders, so this turn falls back to static
    let second = engine.process("How do I file GSTR-1?").await;
    assert_eq!(second.avatar_mode, AvatarMode::Static);

    assert_eq!(chat.calls.load(Ordering::SeqCst), 2);
    assert_eq!(rig.player.played.lock().unwrap().len(), 1);
    assert_eq!(rig.presenter.state(), AvatarState::Idle);
    assert!(!rig.presenter.is_talking());
}

#[tokio::test(start_paused = true)]
async fn test_mode_switches_apply_to_next_turn() {
    let chat = ScriptedChat::answering(GST_ANSWER);
    let voice = ScriptedBackend::working("premium");
    let rig = avatar_rig(None, Duration::from_secs(1));
    let engine = common::engine(chat, synthesizer(&[voice]), rig.presenter.clone());

    engine.set_avatar_mode(AvatarMode::None);
    let turn = engine.process("What is GST?").await;

    assert_eq!(turn.avatar_mode, AvatarMode::None);
    assert_eq!(rig.display.shown_count(), 0);
    assert_eq!(engine.modes().avatar, AvatarMode::None);
}
