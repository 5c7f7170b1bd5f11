//! 对局会话管理
//!
//! 控制面的开局、悔棋、和棋、认输、中止都经过这里。
//! 同一时间最多一个会话；会话在开局时创建，对局结束后清除。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use shakmaty::Chess;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use chess_engine::{EngineError, EngineLauncher, EngineSettings, UciEngine};
use protocol::{parse_fen, EvalMode, GameMetadata, GameRecord, PlayerChoice, StartOptions};

use crate::config::Config;
use crate::dgt::DgtBoard;
use crate::display::preview_state;
use crate::error::GameError;
use crate::evaluation::Evaluator;
use crate::game::{GameHandle, TurnCoordinator};
use crate::hub::StateBroadcastHub;
use crate::player::Player;

/// 进行中的对局
struct GameSession {
    id: u64,
    handle: GameHandle,
    white: String,
    black: String,
}

impl GameSession {
    fn is_running(&self) -> bool {
        !self.handle.state().is_finished()
    }
}

type SessionSlot = Arc<Mutex<Option<GameSession>>>;

/// 对局控制器
pub struct Controller {
    config: Config,
    hub: Arc<StateBroadcastHub>,
    board: Option<DgtBoard>,
    launcher: Arc<dyn EngineLauncher>,
    session: SessionSlot,
    next_id: AtomicU64,
}

impl Controller {
    pub fn new(
        config: Config,
        hub: Arc<StateBroadcastHub>,
        board: Option<DgtBoard>,
        launcher: Arc<dyn EngineLauncher>,
    ) -> Self {
        Self {
            config,
            hub,
            board,
            launcher,
            session: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn bots(&self) -> Vec<String> {
        self.config.bot_names()
    }

    pub fn humans(&self) -> Vec<String> {
        self.config.human_names()
    }

    /// 开始新对局，返回双方名字
    pub async fn start(&self, options: StartOptions) -> Result<(String, String), GameError> {
        let mut session = self.session.lock().await;
        if session.as_ref().is_some_and(GameSession::is_running) {
            return Err(GameError::AlreadyRunning);
        }

        if let Some(board) = &self.board {
            board.set_upside_down(options.upside_down);
        }
        let initial = self.initial_position(&options)?;

        let white = self.player(options.white).await?;
        let black = match self.player(options.black).await {
            Ok(black) => black,
            Err(e) => {
                white.shutdown().await;
                return Err(e);
            }
        };
        let evaluators = self.evaluators(options.eval_mode).await;

        let names = (white.name().to_string(), black.name().to_string());
        let record = GameRecord::new(GameMetadata::new(&names.0, &names.1), initial);
        let handle = TurnCoordinator::start(record, white, black, self.hub.clone(), evaluators);

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.supervise(id, &handle);
        *session = Some(GameSession {
            id,
            handle,
            white: names.0.clone(),
            black: names.1.clone(),
        });

        info!(game = id, white = %names.0, black = %names.1, "新对局");
        Ok(names)
    }

    fn initial_position(&self, options: &StartOptions) -> Result<Chess, GameError> {
        if let Some(fen) = &options.fen {
            return Ok(parse_fen(fen)?);
        }
        if !options.from_board {
            return Ok(Chess::default());
        }

        let snapshot = self
            .board
            .as_ref()
            .and_then(DgtBoard::latest)
            .ok_or_else(|| GameError::InvalidOptions("no board position available".to_string()))?;
        Ok(parse_fen(&snapshot.to_fen())?)
    }

    async fn player(&self, choice: PlayerChoice) -> Result<Player, GameError> {
        match choice {
            PlayerChoice::Human(index) => {
                let human = self.config.humans.get(index).ok_or_else(|| {
                    GameError::InvalidOptions(format!("no human at index {}", index))
                })?;
                let board = self.board.as_ref().ok_or_else(|| {
                    GameError::InvalidOptions("no DGT board configured".to_string())
                })?;
                Ok(Player::board(&human.name, board.subscribe()))
            }
            PlayerChoice::Bot(index) => {
                let bot = self.config.bots.get(index).ok_or_else(|| {
                    GameError::InvalidOptions(format!("no bot at index {}", index))
                })?;
                let settings = bot
                    .settings()
                    .map_err(|e| GameError::InvalidOptions(format!("{:#}", e)))?;
                let engine = self.launch(&bot.name, &bot.engine, &settings).await?;
                Ok(Player::engine(&bot.name, engine, bot.limits()))
            }
        }
    }

    /// 评估引擎启动失败不影响开局
    async fn evaluators(&self, mode: EvalMode) -> Vec<Evaluator> {
        if mode == EvalMode::Off {
            return Vec::new();
        }
        let Some(eval) = &self.config.eval else {
            warn!("未配置评估引擎，本局不评估");
            return Vec::new();
        };

        let settings = match eval.settings() {
            Ok(settings) => settings,
            Err(e) => {
                warn!("评估引擎配置无效: {:#}", e);
                return Vec::new();
            }
        };
        match self.launch("eval", &eval.engine, &settings).await {
            Ok(engine) => vec![Evaluator::new(engine, eval.limits())],
            Err(e) => {
                warn!("评估引擎不可用，本局不评估: {}", e);
                Vec::new()
            }
        }
    }

    async fn launch(
        &self,
        name: &str,
        engine: &str,
        settings: &EngineSettings,
    ) -> Result<UciEngine, GameError> {
        let path = self
            .config
            .engine_path(engine)
            .map_err(|e| GameError::InvalidOptions(e.to_string()))?;
        let unavailable = |source: EngineError| GameError::EngineUnavailable {
            name: name.to_string(),
            source,
        };

        let mut uci = self.launcher.launch(name, path).await.map_err(unavailable)?;
        if let Err(e) = uci.init(settings).await {
            uci.shutdown().await;
            return Err(unavailable(e));
        }
        Ok(uci)
    }

    /// 对局结束后清除会话
    fn supervise(&self, id: u64, handle: &GameHandle) {
        let mut state = handle.subscribe_state();
        let session = self.session.clone();
        tokio::spawn(async move {
            if state.wait_for(|s| s.is_finished()).await.is_err() {
                debug!(game = id, "对局任务已退出");
            }
            let mut session = session.lock().await;
            if session.as_ref().is_some_and(|s| s.id == id) {
                *session = None;
                info!(game = id, "会话已清除");
            }
        });
    }

    /// 当前对局双方名字
    pub async fn running_players(&self) -> Option<(String, String)> {
        let session = self.session.lock().await;
        session
            .as_ref()
            .filter(|s| s.is_running())
            .map(|s| (s.white.clone(), s.black.clone()))
    }

    fn running(session: &Option<GameSession>) -> Result<&GameHandle, GameError> {
        session
            .as_ref()
            .filter(|s| s.is_running())
            .map(|s| &s.handle)
            .ok_or(GameError::NoActiveGame)
    }

    pub async fn undo(&self, plies: usize) -> Result<(), GameError> {
        let session = self.session.lock().await;
        Self::running(&session)?.undo(plies).await
    }

    pub async fn draw(&self) -> Result<(), GameError> {
        let session = self.session.lock().await;
        Self::running(&session)?.draw().await
    }

    pub async fn resign(&self) -> Result<(), GameError> {
        let session = self.session.lock().await;
        Self::running(&session)?.resign().await
    }

    pub async fn abort(&self) -> Result<(), GameError> {
        let session = self.session.lock().await;
        Self::running(&session)?.abort().await
    }

    /// 空闲时把棋盘上的实际摆放推送给观察者
    pub fn spawn_preview(&self) -> Option<JoinHandle<()>> {
        let mut snapshots = self.board.as_ref()?.subscribe();
        let hub = self.hub.clone();
        let session = self.session.clone();

        Some(tokio::spawn(async move {
            while snapshots.changed().await.is_ok() {
                let snapshot = snapshots.borrow_and_update().clone();
                let Some(snapshot) = snapshot else {
                    continue;
                };
                let idle = !session.lock().await.as_ref().is_some_and(GameSession::is_running);
                if !idle {
                    continue;
                }
                // 对局可能在检查之后刚开始，已开始的状态不覆盖
                let preview = preview_state(&snapshot);
                hub.update(|state| {
                    if state.started {
                        return false;
                    }
                    *state = preview;
                    true
                });
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chess_engine::{ScriptedLauncher, ScriptedReply};
    use protocol::ErrorCode;
    use shakmaty::Board;
    use tokio::io::AsyncWriteExt;

    use crate::config::{BotConfig, EvalConfig, HumanConfig};
    use crate::dgt::tests::{read_startup, DuplexPort};

    const ENGINE: &str = "/opt/engines/fake";

    fn bot(name: &str) -> BotConfig {
        BotConfig {
            name: name.to_string(),
            engine: "fake".to_string(),
            skill_level: Some(3),
            threads: None,
            move_time_ms: 100,
            depth: None,
            options: Vec::new(),
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.engines.insert("fake".to_string(), ENGINE.to_string());
        config.bots = vec![bot("Alpha"), bot("Beta")];
        config.humans = vec![HumanConfig {
            name: "Alice".to_string(),
        }];
        config.eval = Some(EvalConfig {
            engine: "fake".to_string(),
            depth: Some(10),
            threads: None,
            move_time_ms: 100,
            multi_pv: None,
            options: Vec::new(),
        });
        config
    }

    fn options(white: PlayerChoice, black: PlayerChoice) -> StartOptions {
        StartOptions {
            white,
            black,
            eval_mode: EvalMode::Off,
            upside_down: false,
            fen: None,
            from_board: false,
        }
    }

    fn controller(launcher: ScriptedLauncher, board: Option<DgtBoard>) -> Controller {
        Controller::new(
            config(),
            Arc::new(StateBroadcastHub::new()),
            board,
            Arc::new(launcher),
        )
    }

    async fn wait_idle(controller: &Controller) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while controller.running_players().await.is_some() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_start_bot_game() {
        let launcher = ScriptedLauncher::new();
        launcher.push(ENGINE, vec![ScriptedReply::Silent]).await;
        launcher.push(ENGINE, Vec::new()).await;
        let controller = controller(launcher, None);

        let names = controller
            .start(options(PlayerChoice::Bot(0), PlayerChoice::Bot(1)))
            .await
            .unwrap();
        assert_eq!(names, ("Alpha".to_string(), "Beta".to_string()));
        assert_eq!(controller.running_players().await, Some(names));

        let err = controller
            .start(options(PlayerChoice::Bot(0), PlayerChoice::Bot(1)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::GameAlreadyRunning);

        controller.abort().await.unwrap();
        wait_idle(&controller).await;
        assert_eq!(controller.undo(1).await.unwrap_err().code(), ErrorCode::NoActiveGame);
    }

    #[tokio::test]
    async fn test_invalid_start_options() {
        let controller = controller(ScriptedLauncher::new(), None);

        // 没有棋盘时不能选择人类棋手
        let err = controller
            .start(options(PlayerChoice::Human(0), PlayerChoice::Bot(0)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidStartOptions);

        let err = controller
            .start(options(PlayerChoice::Bot(7), PlayerChoice::Bot(0)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidStartOptions);

        let mut bad_fen = options(PlayerChoice::Bot(0), PlayerChoice::Bot(1));
        bad_fen.fen = Some("not a fen".to_string());
        let err = controller.start(bad_fen).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidFen);

        // 启动脚本缺失，引擎不可用
        let err = controller
            .start(options(PlayerChoice::Bot(0), PlayerChoice::Bot(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::EngineUnavailable { .. }));
        assert!(controller.running_players().await.is_none());
    }

    #[tokio::test]
    async fn test_start_from_fen_until_mate() {
        let launcher = ScriptedLauncher::new();
        launcher.push(ENGINE, Vec::new()).await;
        launcher.push(ENGINE, vec![ScriptedReply::play("d8h4")]).await;
        let controller = controller(launcher, None);

        // 评估引擎没有脚本，启动失败后照常开局
        let mut start = options(PlayerChoice::Bot(0), PlayerChoice::Bot(1));
        start.eval_mode = EvalMode::LastMove;
        start.fen = Some("rnbqkbnr/pppp1ppp/8/4p3/6P1/5P2/PPPPP2P/RNBQKBNR b KQkq - 0 2".to_string());
        controller.start(start).await.unwrap();

        wait_idle(&controller).await;
        let state = controller.hub.current();
        assert_eq!(state.outcome, "0-1");
        assert_eq!(state.moves.len(), 1);
        assert_eq!(state.moves[0].san, "Qh4#");

        // 上一局结束后可以开始新对局
        let err = controller
            .start(options(PlayerChoice::Bot(0), PlayerChoice::Bot(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::EngineUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_human_game_with_board() {
        let (port, mut device) = DuplexPort::pair();
        let board = DgtBoard::spawn(port, Duration::from_millis(20));
        let launcher = ScriptedLauncher::new();
        launcher.push(ENGINE, Vec::new()).await;
        let controller = controller(launcher, Some(board));
        read_startup(&mut device).await;

        let mut start = options(PlayerChoice::Human(0), PlayerChoice::Bot(0));
        start.upside_down = true;
        let names = controller.start(start).await.unwrap();
        assert_eq!(names.0, "Alice");
        assert!(controller.board.as_ref().unwrap().is_upside_down());

        controller.resign().await.unwrap();
        wait_idle(&controller).await;
        assert_eq!(controller.hub.current().outcome, "0-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_preview_and_start_from_board() {
        let (port, mut device) = DuplexPort::pair();
        let board = DgtBoard::spawn(port, Duration::from_millis(200));
        let launcher = ScriptedLauncher::new();
        launcher.push(ENGINE, Vec::new()).await;
        let controller = controller(launcher, Some(board));
        let _preview = controller.spawn_preview().unwrap();
        read_startup(&mut device).await;

        let mut setup = Board::empty();
        setup.set_piece_at(shakmaty::Square::E1, shakmaty::Color::White.king());
        setup.set_piece_at(shakmaty::Square::E8, shakmaty::Color::Black.king());
        setup.set_piece_at(
            shakmaty::Square::A2,
            shakmaty::Piece {
                color: shakmaty::Color::White,
                role: shakmaty::Role::Pawn,
            },
        );
        let snapshot = protocol::BoardSnapshot::from_board(&setup);
        device
            .write_all(&snapshot.to_frame(false).encode())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let state = controller.hub.current();
        assert_eq!(state.fen, "4k3/8/8/8/8/8/P7/4K3 w - - 0 1");
        assert!(!state.started);

        let mut start = options(PlayerChoice::Human(0), PlayerChoice::Bot(0));
        start.from_board = true;
        controller.start(start).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let state = controller.hub.current();
        assert!(state.started);
        assert_eq!(state.fen, "4k3/8/8/8/8/8/P7/4K3 w - - 0 1");

        controller.abort().await.unwrap();
    }
}
