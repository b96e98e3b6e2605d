//! Variable-timestep simulation tick
//!
//! One call advances the world by one frame: stream chunks, move the player,
//! steer and resolve enemies, run combat, ease remote proxies and (on the
//! host) spawn new enemies.

use glam::Vec2;
use rand::Rng;

use super::combat::{ActiveAttack, attack_regions, knockback_from, region_hits};
use super::entity::{Collidable, Status};
use super::geometry::Rect;
use super::motion::{WithBodies, apply_knockback, move_body};
use super::state::{EnemyKind, GameState, ReplicatedAction};
use super::steering::{Agent, TargetKind, WorldContext, steer};
use crate::consts::*;
use crate::{angle_to_dir, clamp_dt, dir_to_angle, frame_scale};

/// Input intent for a single frame
#[derive(Debug, Clone, Default)]
pub struct TickInput {
    /// Movement intent (normalized here)
    pub movement: Vec2,
    /// Swing the main weapon
    pub attack: bool,
    /// Aim angle in degrees (screen space)
    pub aim_angle: f32,
    pub dash: bool,
    /// Idle/demo mode - AI drives the player
    pub idle_mode: bool,
}

/// Advance the game state by `dt` seconds (clamped to `MAX_DT`)
pub fn tick(state: &mut GameState, input: &TickInput, dt: f32) {
    let dt = clamp_dt(dt);
    state.clock_ms += dt as f64 * 1000.0;
    let now = state.clock_ms;
    state.hit_stop.expire(now);

    let input = if input.idle_mode {
        autopilot(state)
    } else {
        input.clone()
    };

    state.difficulty.update(now);

    let center = state.player.center();
    state.world.update(center, &mut state.obstacles);

    if update_player(state, &input, dt, now) {
        return;
    }
    update_enemies(state, dt, now);

    for remote in state.remote_players.values_mut() {
        remote.update(dt);
    }

    run_spawner(state, now);
}

/// Returns true if the run was reset
fn update_player(state: &mut GameState, input: &TickInput, dt: f32, now: f64) -> bool {
    let player = &mut state.player;

    if let Some(died_at) = player.died_at_ms {
        if now - died_at >= PLAYER_DEATH_MS + PLAYER_RESPAWN_DELAY_MS {
            state.reset_run();
            return true;
        }
        player.status = Status::Dead;
        apply_knockback(&mut player.body, PLAYER_KNOCKBACK_DECAY, dt, &state.obstacles);
        return false;
    }

    if !player.is_dashing() {
        player.stamina = (player.stamina + STAMINA_REGEN * dt).min(MAX_STAMINA);
    }
    if player.hurt_until_ms.is_some_and(|t| now >= t) {
        player.hurt_until_ms = None;
    }

    let movement = input.movement.normalize_or_zero();
    if movement != Vec2::ZERO {
        player.facing = movement;
    }

    // Swing
    if input.attack && !player.is_hurt(now) && player.weapon_clock.try_fire(now) {
        let angles = vec![input.aim_angle];
        let regions = attack_regions(player.center(), &angles, player.weapon.range);
        player.attack = ActiveAttack::new(regions, now);
        state.outbox.push(ReplicatedAction::Attack {
            weapon: player.weapon.id.clone(),
            angles,
        });
    }

    // Dash
    if player.dash_started_ms.is_some_and(|t| now - t > DASH_DURATION_MS) {
        player.dash_started_ms = None;
    }
    let dash_ready = player
        .last_dash_ms
        .is_none_or(|t| now - t >= DASH_COOLDOWN_MS);
    if input.dash && !player.is_dashing() && dash_ready && player.stamina >= DASH_COST {
        player.stamina -= DASH_COST;
        player.dash_started_ms = Some(now);
        player.last_dash_ms = Some(now);
        player.dash_dir = if movement != Vec2::ZERO { movement } else { player.facing };
    }

    let velocity = if player.is_dashing() {
        player.dash_dir * DASH_SPEED * frame_scale(dt)
    } else {
        movement * player.speed * frame_scale(dt)
    };

    // Enemies are solid unless dashing through them
    let bodies: Vec<Rect> = if player.is_dashing() {
        Vec::new()
    } else {
        state
            .enemies
            .iter()
            .filter(|e| e.blocks_movement())
            .map(|e| e.hitbox())
            .collect()
    };
    let solids = WithBodies {
        obstacles: &state.obstacles,
        bodies: &bodies,
    };
    move_body(&mut player.body, velocity, &solids);
    apply_knockback(&mut player.body, PLAYER_KNOCKBACK_DECAY, dt, &solids);

    player.status = if player.is_hurt(now) {
        Status::Hurt
    } else if player.attack.is_live(now) {
        Status::Attack
    } else if movement != Vec2::ZERO || player.is_dashing() {
        Status::Walk
    } else {
        Status::Idle
    };
    false
}

fn update_enemies(state: &mut GameState, dt: f32, now: f64) {
    let obstacles = &state.obstacles;
    let player = &mut state.player;
    let enemies = &mut state.enemies;
    let rng = &mut state.rng;
    let hit_stop = &mut state.hit_stop;
    let outbox = &mut state.outbox;

    let player_center = player.center();
    let remotes: Vec<Vec2> = state.remote_players.values().map(|r| r.pos).collect();
    let flock: Vec<Vec2> = enemies.iter().map(|e| e.center()).collect();
    let attack_live = player.attack.is_live(now);
    let despawn_sq = ENEMY_DESPAWN_DISTANCE * ENEMY_DESPAWN_DISTANCE;
    let freeze_sq = ENEMY_FREEZE_DISTANCE * ENEMY_FREEZE_DISTANCE;
    let mut removed = vec![false; enemies.len()];

    for (i, enemy) in enemies.iter_mut().enumerate() {
        let dist_sq = enemy.center().distance_squared(player_center);
        if dist_sq > despawn_sq {
            log::trace!("Despawning distant enemy {}", enemy.uid);
            removed[i] = true;
            continue;
        }

        if enemy.is_dead() {
            if enemy.death_finished(now) {
                removed[i] = true;
                if state.authority.is_host {
                    outbox.push(ReplicatedAction::KillEnemy {
                        uid: enemy.uid.clone(),
                    });
                }
            } else {
                apply_knockback(&mut enemy.body, ENEMY_KNOCKBACK_DECAY, dt, obstacles);
            }
            continue;
        }

        // Frozen: knockback only
        if dist_sq > freeze_sq {
            apply_knockback(&mut enemy.body, ENEMY_KNOCKBACK_DECAY, dt, obstacles);
            continue;
        }

        // Player strikes (one hit per hurt window)
        if attack_live && enemy.hurt_until_ms.is_none() {
            let polygon = enemy.hit_polygon(&state.hit_shapes);
            if region_hits(&player.attack.regions, &polygon) {
                enemy.health -= player.weapon.damage;
                enemy.body.knockback =
                    knockback_from(player_center, enemy.center(), player.weapon.knockback);
                hit_stop.raise(now, state.hit_stop_ms);
                if enemy.health <= 0.0 {
                    enemy.kill(now);
                } else {
                    enemy.hurt_until_ms = Some(now + ENEMY_HURT_MS);
                }
            }
        }

        if !enemy.is_dead() && !enemy.refresh_locks(now) {
            let ctx = WorldContext {
                player: (!player.is_dead()).then_some(player_center),
                remote_players: &remotes,
                obstacles,
                now_ms: now,
            };
            let agent = Agent {
                pos: enemy.center(),
                hitbox: enemy.body.hitbox,
                params: enemy.params,
                flock: &flock,
                slot: i,
            };
            let out = steer(&agent, &ctx, &mut enemy.steering, dt, rng);

            if let Some(target) = out.attack {
                enemy.status = Status::Attack;
                enemy.attack_until_ms = Some(now + ENEMY_ATTACK_LOCK_MS);
                // Remote targets take damage on their own peer
                if target == TargetKind::Local {
                    player.take_damage(enemy.damage, enemy.center(), now);
                }
            } else {
                let velocity = out.direction * enemy.speed * frame_scale(dt);
                move_body(&mut enemy.body, velocity, obstacles);
                enemy.status = if out.direction != Vec2::ZERO {
                    Status::Walk
                } else {
                    Status::Idle
                };
            }
        }

        apply_knockback(&mut enemy.body, ENEMY_KNOCKBACK_DECAY, dt, obstacles);
    }

    let mut slot = 0;
    enemies.retain(|_| {
        let keep = !removed[slot];
        slot += 1;
        keep
    });
}

/// Host-only enemy spawning on the difficulty cooldown
fn run_spawner(state: &mut GameState, now: f64) {
    if !state.authority.is_host || state.player.is_dead() {
        return;
    }
    if now - state.last_spawn_ms <= state.difficulty.spawn_cooldown_ms {
        return;
    }
    state.last_spawn_ms = now;
    if state.enemies.len() >= state.max_enemies {
        return;
    }

    let minutes = (state.survival_ms() / 60_000.0).floor() as u32;
    let multiplier = state.difficulty.multiplier;
    let center = state.player.center();
    let rng = &mut state.rng;

    let cluster = if minutes >= 3 {
        (rng.random::<f32>() < 0.3).then(|| rng.random_range(8..=12))
    } else if minutes >= 1 {
        (rng.random::<f32>() < 0.2).then(|| rng.random_range(3..=5))
    } else {
        None
    };

    let mut spawns: Vec<(EnemyKind, Vec2)> = Vec::new();
    match cluster {
        Some(count) => {
            let angle = rng.random_range(0.0..360.0);
            let hub = center + angle_to_dir(angle) * rng.random_range(700.0..900.0);
            for _ in 0..count {
                let offset = Vec2::new(
                    rng.random_range(-100.0..=100.0),
                    rng.random_range(-100.0..=100.0),
                );
                spawns.push((EnemyKind::Orc, hub + offset));
            }
        }
        None => {
            let angle = rng.random_range(0.0..360.0);
            let pos = center + angle_to_dir(angle) * rng.random_range(700.0..1200.0);
            let captain_chance = (0.02 * multiplier).min(0.4);
            let kind = if rng.random::<f32>() < captain_chance {
                EnemyKind::OrcCaptain
            } else {
                EnemyKind::Orc
            };
            spawns.push((kind, pos));
        }
    }

    log::debug!("Spawning {} enemies at difficulty {:.2}", spawns.len(), multiplier);
    for (kind, pos) in spawns {
        let uid = state.next_enemy_uid();
        if state.spawn_enemy(&uid, kind, pos, multiplier) {
            state.outbox.push(ReplicatedAction::SpawnEnemy {
                uid,
                kind,
                pos,
                difficulty: multiplier,
            });
        }
    }
}

/// Demo driver: kite the nearest enemy and swing when it is in reach
fn autopilot(state: &GameState) -> TickInput {
    let me = state.player.center();
    let reach = state.player.weapon.range * 0.8;
    let nearest = state
        .enemies
        .iter()
        .filter(|e| !e.is_dead())
        .map(|e| (e.center(), e.center().distance_squared(me)))
        .min_by(|a, b| a.1.total_cmp(&b.1));

    match nearest {
        Some((pos, dist_sq)) => {
            let to = pos - me;
            let movement = if dist_sq < (reach * 0.6).powi(2) {
                -to
            } else if dist_sq < 400.0 * 400.0 {
                to
            } else {
                wander(state.clock_ms)
            };
            TickInput {
                movement,
                attack: dist_sq < reach * reach,
                aim_angle: dir_to_angle(to),
                dash: dist_sq < 40.0 * 40.0,
                idle_mode: true,
            }
        }
        None => TickInput {
            movement: wander(state.clock_ms),
            idle_mode: true,
            ..Default::default()
        },
    }
}

fn wander(clock_ms: f64) -> Vec2 {
    angle_to_dir((clock_ms * 0.02 % 360.0) as f32)
}
