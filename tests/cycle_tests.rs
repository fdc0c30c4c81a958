//! End-to-end cycles against an in-memory game server.

use notpixel::api::{
    ApiError, AuthToken, ClaimResponse, Connector, GameApi, MiningStatus, RepaintResponse,
    SpecialRequest, TemplateInfo, UserInfo,
};
use notpixel::color::PaletteColor;
use notpixel::config::BotConfig;
use notpixel::cycle::{Bot, CycleError};
use notpixel::plan::{CellId, PaintInstruction};
use notpixel::profiles::Profile;
use notpixel::schedule::ScheduleMode;
use notpixel::session::FileSessionProvider;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::rc::Rc;
use tempfile::TempDir;

const BLACK: PaletteColor = PaletteColor::new(0, 0, 0);
const WHITE: PaletteColor = PaletteColor::new(255, 255, 255);

/// Shared server state seen by every account's client.
#[derive(Default)]
struct World {
    charges: RefCell<HashMap<String, u32>>,
    paints: RefCell<Vec<(String, PaintInstruction)>>,
    template_calls: Cell<usize>,
    claims: Cell<usize>,
}

impl World {
    fn with_charges(charges: &[(&str, u32)]) -> Rc<Self> {
        let world = World::default();
        world.set_charges(charges);
        Rc::new(world)
    }

    fn set_charges(&self, charges: &[(&str, u32)]) {
        let mut map = self.charges.borrow_mut();
        for (account, n) in charges {
            map.insert(account.to_string(), *n);
        }
    }

    fn painted_cells(&self) -> BTreeSet<CellId> {
        self.paints.borrow().iter().map(|(_, i)| i.cell).collect()
    }
}

struct FakeApi {
    world: Rc<World>,
    account: String,
}

impl GameApi for FakeApi {
    async fn me(&self, _token: &AuthToken) -> Result<UserInfo, ApiError> {
        Ok(UserInfo { id: Some(1), first_name: self.account.clone(), last_name: "Test".into() })
    }

    async fn mining_status(&self, _token: &AuthToken) -> Result<MiningStatus, ApiError> {
        let charges = self.world.charges.borrow().get(&self.account).copied().unwrap_or(0);
        Ok(MiningStatus { user_balance: 100.0, charges, ..Default::default() })
    }

    async fn claim(&self, _token: &AuthToken) -> Result<ClaimResponse, ApiError> {
        self.world.claims.set(self.world.claims.get() + 1);
        Ok(ClaimResponse { claimed: 1.5 })
    }

    async fn template(&self, _token: &AuthToken) -> Result<TemplateInfo, ApiError> {
        self.world.template_calls.set(self.world.template_calls.get() + 1);
        Ok(TemplateInfo { id: None, x: 5, y: 2, size: 2, url: None })
    }

    async fn repaint(
        &self,
        _token: &AuthToken,
        instruction: PaintInstruction,
    ) -> Result<RepaintResponse, ApiError> {
        // give other accounts a chance to run, like a real round trip would
        tokio::task::yield_now().await;
        let left = {
            let mut charges = self.world.charges.borrow_mut();
            let left = charges.entry(self.account.clone()).or_insert(0);
            if *left == 0 {
                return Err(ApiError::Status { status: 400, body: "no charges".into() });
            }
            *left -= 1;
            *left
        };
        self.world.paints.borrow_mut().push((self.account.clone(), instruction));
        Ok(RepaintResponse { balance: 100.0 + left as f64 })
    }

    async fn special(&self, _token: &AuthToken, _request: SpecialRequest) -> Result<(), ApiError> {
        Ok(())
    }
}

struct FakeConnector {
    world: Rc<World>,
}

impl Connector for FakeConnector {
    type Api = FakeApi;

    fn connect(&self, profile: &Profile) -> Result<FakeApi, ApiError> {
        Ok(FakeApi { world: Rc::clone(&self.world), account: profile.name.clone() })
    }
}

/// Palette, a 2x2 reference image, three profiles and tokens for two of them.
fn setup(dir: &Path) -> BotConfig {
    std::fs::write(dir.join("mau.txt"), "#000000\n#FFFFFF\n").unwrap();

    // row 0: near-black, near-white; row 1: near-white, black
    let image = image::RgbImage::from_fn(2, 2, |x, y| match (x, y) {
        (0, 0) => image::Rgb([10, 10, 10]),
        (1, 1) => image::Rgb([0, 0, 0]),
        _ => image::Rgb([245, 240, 250]),
    });
    image.save(dir.join("image.png")).unwrap();

    std::fs::write(dir.join("profile.json"), r#"[{"name": "a"}, {"name": "b"}, {"name": "c"}]"#).unwrap();
    std::fs::write(
        dir.join("userdata.json"),
        r#"[{"name": "a", "authorization": "tok-a"}, {"name": "b", "authorization": "tok-b"}]"#,
    )
    .unwrap();

    let mut config = BotConfig::default();
    config.files.palette = dir.join("mau.txt");
    config.files.image = dir.join("image.png");
    config.files.profiles = dir.join("profile.json");
    config.files.sessions = dir.join("userdata.json");
    config.files.ledger = dir.join("repainted_pixels.json");
    config.repaint.paint_delay_ms = 0;
    config.schedule.concurrency = 2;
    config
}

fn bot(config: BotConfig, world: &Rc<World>) -> Bot<FakeConnector, FileSessionProvider> {
    let sessions = FileSessionProvider::new(&config.files.sessions);
    Bot::new(config, FakeConnector { world: Rc::clone(world) }, sessions)
}

fn ledger_cells(path: &Path) -> BTreeSet<CellId> {
    let text = std::fs::read_to_string(path).unwrap();
    let map: HashMap<String, bool> = serde_json::from_str(&text).unwrap();
    map.into_iter().filter(|(_, painted)| *painted).map(|(k, _)| k.parse().unwrap()).collect()
}

#[tokio::test]
async fn test_cycle_paints_whole_template_across_accounts() {
    let temp = TempDir::new().unwrap();
    let config = setup(temp.path());
    let ledger_path = config.files.ledger.clone();
    let world = World::with_charges(&[("a", 4), ("b", 4)]);

    let report = bot(config, &world).run_cycle().await.unwrap();

    assert_eq!(report.accounts, 3);
    assert_eq!(report.succeeded, 2);
    // "c" has no session and no renewal command
    assert_eq!(report.failed, 1);
    assert_eq!(report.painted as usize, world.paints.borrow().len());
    assert_eq!(world.painted_cells(), BTreeSet::from([2006, 2007, 3006, 3007]));
    assert_eq!(ledger_cells(&ledger_path), BTreeSet::from([2006, 2007, 3006, 3007]));
    assert_eq!(world.claims.get(), 2);

    let colors: HashMap<CellId, PaletteColor> =
        world.paints.borrow().iter().map(|(_, i)| (i.cell, i.color)).collect();
    assert_eq!(colors[&2006], BLACK);
    assert_eq!(colors[&2007], WHITE);
    assert_eq!(colors[&3006], WHITE);
    assert_eq!(colors[&3007], BLACK);
}

#[tokio::test]
async fn test_single_account_never_repaints_a_cell() {
    let temp = TempDir::new().unwrap();
    let mut config = setup(temp.path());
    std::fs::write(&config.files.profiles, r#"[{"name": "a"}]"#).unwrap();
    config.schedule.mode = ScheduleMode::Pool;
    let world = World::with_charges(&[("a", 10)]);

    let report = bot(config, &world).run_cycle().await.unwrap();

    assert_eq!(report.painted, 4);
    assert_eq!(world.paints.borrow().len(), 4);
    assert_eq!(world.painted_cells().len(), 4);
    assert_eq!(world.charges.borrow()["a"], 6);
}

#[tokio::test]
async fn test_stale_ledger_is_cleared_at_cycle_start() {
    let temp = TempDir::new().unwrap();
    let mut config = setup(temp.path());
    std::fs::write(&config.files.profiles, r#"[{"name": "a"}]"#).unwrap();
    std::fs::write(&config.files.ledger, r#"{"3007": true, "2006": true}"#).unwrap();
    config.schedule.claim_rewards = false;
    let world = World::with_charges(&[("a", 4)]);
    let bot = bot(config, &world);

    let first = bot.run_cycle().await.unwrap();
    assert_eq!(first.painted, 4);
    assert!(world.painted_cells().contains(&3007));

    // next cycle starts from an empty ledger again
    world.set_charges(&[("a", 4)]);
    let second = bot.run_cycle().await.unwrap();
    assert_eq!(second.painted, 4);
    assert_eq!(world.paints.borrow().len(), 8);
    assert_eq!(world.claims.get(), 0);
}

#[tokio::test]
async fn test_restricted_colors_limit_the_plan() {
    let temp = TempDir::new().unwrap();
    let mut config = setup(temp.path());
    std::fs::write(&config.files.profiles, r#"[{"name": "a"}]"#).unwrap();
    config.repaint.allowed_colors = Some(vec!["#000000".into()]);
    let world = World::with_charges(&[("a", 10)]);

    let report = bot(config, &world).run_cycle().await.unwrap();

    assert_eq!(report.painted, 2);
    assert_eq!(world.painted_cells(), BTreeSet::from([2006, 3007]));
}

#[tokio::test]
async fn test_repaint_disabled_only_reports_status() {
    let temp = TempDir::new().unwrap();
    let mut config = setup(temp.path());
    config.repaint.enabled = false;
    // the image is not needed when not painting
    std::fs::remove_file(&config.files.image).unwrap();
    let world = World::with_charges(&[("a", 5), ("b", 5)]);

    let report = bot(config, &world).run_cycle().await.unwrap();

    assert_eq!(report.succeeded, 2);
    assert_eq!(report.painted, 0);
    assert_eq!(world.template_calls.get(), 0);
    assert!(world.paints.borrow().is_empty());
}

#[tokio::test]
async fn test_missing_image_aborts_cycle() {
    let temp = TempDir::new().unwrap();
    let config = setup(temp.path());
    std::fs::remove_file(&config.files.image).unwrap();
    let world = World::with_charges(&[("a", 5)]);

    let result = bot(config, &world).run_cycle().await;

    assert!(matches!(result, Err(CycleError::Analyze(_))));
    assert!(world.paints.borrow().is_empty());
}

#[tokio::test]
async fn test_missing_profiles_aborts_cycle() {
    let temp = TempDir::new().unwrap();
    let config = setup(temp.path());
    std::fs::remove_file(&config.files.profiles).unwrap();
    let world = World::with_charges(&[]);

    let result = bot(config, &world).run_cycle().await;
    assert!(matches!(result, Err(CycleError::Profiles(_))));
}

#[tokio::test]
async fn test_run_once_returns_cycle_report() {
    let temp = TempDir::new().unwrap();
    let config = setup(temp.path());
    let world = World::with_charges(&[("a", 1), ("b", 1)]);

    let report = bot(config, &world).run(true).await.unwrap();
    assert_eq!(report.painted, 2);
}
