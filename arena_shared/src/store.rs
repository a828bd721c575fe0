//! Entity Store.
//!
//! The single owner of all entity state. Storage is typed per entity kind and
//! keyed by id; every operation is a synchronous in-memory mutation. Ordered
//! maps keep iteration stable so client and server walk entities in the same
//! order.

use std::collections::BTreeMap;

use crate::{
    entity::{Bomb, BombId, Bullet, BulletId, EntityKey, Player, PlayerId},
    render::EntityPose,
    weapon::WeaponTable,
};

/// An entity kind the store can hold.
pub trait StoredEntity: Clone + PartialEq + Sized {
    type Id: Copy + Ord + std::fmt::Debug;

    fn id(&self) -> Self::Id;
    fn key(id: Self::Id) -> EntityKey;

    #[doc(hidden)]
    fn table(store: &EntityStore) -> &BTreeMap<Self::Id, Self>;
    #[doc(hidden)]
    fn table_mut(store: &mut EntityStore) -> &mut BTreeMap<Self::Id, Self>;
}

/// Authoritative-plus-predicted state of the match.
#[derive(Debug, Default, Clone)]
pub struct EntityStore {
    players: BTreeMap<PlayerId, Player>,
    bullets: BTreeMap<BulletId, Bullet>,
    bombs: BTreeMap<BombId, Bomb>,
    local_player: Option<PlayerId>,
}

impl EntityStore {
    /// Inserts or replaces an entity. Returns `true` if the stored value
    /// changed, so repeating an identical upsert is a no-op.
    pub fn upsert<E: StoredEntity>(&mut self, entity: E) -> bool {
        let table = E::table_mut(self);
        match table.get(&entity.id()) {
            Some(existing) if *existing == entity => false,
            _ => {
                table.insert(entity.id(), entity);
                true
            }
        }
    }

    /// Removes an entity. Removing a missing id is not an error.
    pub fn remove<E: StoredEntity>(&mut self, id: E::Id) -> Option<E> {
        E::table_mut(self).remove(&id)
    }

    pub fn get<E: StoredEntity>(&self, id: E::Id) -> Option<&E> {
        E::table(self).get(&id)
    }

    pub fn get_mut<E: StoredEntity>(&mut self, id: E::Id) -> Option<&mut E> {
        E::table_mut(self).get_mut(&id)
    }

    pub fn contains<E: StoredEntity>(&self, id: E::Id) -> bool {
        E::table(self).contains_key(&id)
    }

    /// Iterates all entities of one kind in id order.
    pub fn iter<'a, E: StoredEntity + 'a>(&'a self) -> impl Iterator<Item = &'a E> + 'a {
        E::table(self).values()
    }

    pub fn ids<E: StoredEntity>(&self) -> Vec<E::Id> {
        E::table(self).keys().copied().collect()
    }

    /// Keeps only the entities of one kind for which `keep` returns true.
    pub fn retain<E: StoredEntity>(&mut self, mut keep: impl FnMut(&E) -> bool) {
        E::table_mut(self).retain(|_, e| keep(e));
    }

    pub fn len<E: StoredEntity>(&self) -> usize {
        E::table(self).len()
    }

    pub fn set_local_player(&mut self, id: Option<PlayerId>) {
        self.local_player = id;
    }

    pub fn local_player_id(&self) -> Option<PlayerId> {
        self.local_player
    }

    pub fn local_player(&self) -> Option<&Player> {
        self.local_player.and_then(|id| self.players.get(&id))
    }

    pub fn local_player_mut(&mut self) -> Option<&mut Player> {
        let id = self.local_player?;
        self.players.get_mut(&id)
    }

    /// Drops every entity. The local player id is kept.
    pub fn clear(&mut self) {
        self.players.clear();
        self.bullets.clear();
        self.bombs.clear();
    }

    /// Renderer-facing view of every live entity.
    ///
    /// Bullets are placed along their trajectory at `server_now_ms`.
    pub fn poses<'a>(
        &'a self,
        server_now_ms: u64,
        weapons: &'a WeaponTable,
    ) -> impl Iterator<Item = EntityPose> + 'a {
        let players = self.players.values().filter(|p| p.alive).map(|p| EntityPose {
            key: EntityKey::Player(p.id),
            position: p.position,
            yaw: p.yaw,
            pitch: p.pitch,
        });
        let bullets = self.bullets.values().map(move |b| EntityPose {
            key: EntityKey::Bullet(b.id),
            position: b.position_at(server_now_ms, weapons.stats(b.weapon).bullet_speed),
            yaw: b.direction.x.atan2(b.direction.z),
            pitch: b.direction.y.clamp(-1.0, 1.0).asin(),
        });
        let bombs = self
            .bombs
            .values()
            .filter(|b| !b.detonated)
            .map(|b| EntityPose {
                key: EntityKey::Bomb(b.id),
                position: b.position,
                yaw: 0.0,
                pitch: 0.0,
            });
        players.chain(bullets).chain(bombs)
    }
}

impl StoredEntity for Player {
    type Id = PlayerId;

    fn id(&self) -> PlayerId {
        self.id
    }

    fn key(id: PlayerId) -> EntityKey {
        EntityKey::Player(id)
    }

    fn table(store: &EntityStore) -> &BTreeMap<PlayerId, Self> {
        &store.players
    }

    fn table_mut(store: &mut EntityStore) -> &mut BTreeMap<PlayerId, Self> {
        &mut store.players
    }
}

impl StoredEntity for Bullet {
    type Id = BulletId;

    fn id(&self) -> BulletId {
        self.id
    }

    fn key(id: BulletId) -> EntityKey {
        EntityKey::Bullet(id)
    }

    fn table(store: &EntityStore) -> &BTreeMap<BulletId, Self> {
        &store.bullets
    }

    fn table_mut(store: &mut EntityStore) -> &mut BTreeMap<BulletId, Self> {
        &mut store.bullets
    }
}

impl StoredEntity for Bomb {
    type Id = BombId;

    fn id(&self) -> BombId {
        self.id
    }

    fn key(id: BombId) -> EntityKey {
        EntityKey::Bomb(id)
    }

    fn table(store: &EntityStore) -> &BTreeMap<BombId, Self> {
        &store.bombs
    }

    fn table_mut(store: &mut EntityStore) -> &mut BTreeMap<BombId, Self> {
        &mut store.bombs
    }
}
