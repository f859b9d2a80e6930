//! Scene module
//!
//! Owns every placed image in z-order, the id allocator and the current
//! selection. All commands are synchronous and run to completion; the render
//! pipeline in `render.rs` is the only asynchronous consumer.

use peniko::kurbo::Point;
use peniko::ImageData;
use std::sync::Weak;

use crate::config::EngineConfig;
use crate::error::SceneError;
use crate::image::{Image, PixelBuffer};

pub type ImageId = u32;

/// Current and intrinsic size of an image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageSize {
    pub width: f64,
    pub height: f64,
    pub original_width: f64,
    pub original_height: f64,
}

/// The image scene.
///
/// `images` is kept in insertion order, which is also z-order (last = top).
/// Ids are handed out monotonically, so the vector is sorted by id as well and
/// lookups are a binary search. `selected` is a plain id checked against the
/// vector on use; deleting the selected image clears it.
pub struct SceneManager<B = ImageData> {
    pub(crate) images: Vec<Image<B>>,
    next_id: ImageId,
    selected: Option<ImageId>,
    config: EngineConfig,
    pub(crate) render_pass: Weak<()>,
}

impl<B> SceneManager<B> {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            images: Vec::new(),
            next_id: 0,
            selected: None,
            config,
            render_pass: Weak::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Copy `rgba` into a new image placed at the origin on top of the scene.
    pub fn add_image(&mut self, width: u32, height: u32, rgba: &[u8]) -> Result<ImageId, SceneError> {
        let buffer = PixelBuffer::from_rgba(rgba, width, height)?;

        let id = self.next_id;
        self.next_id = id.checked_add(1).ok_or(SceneError::IdsExhausted)?;
        self.images.push(Image::new(id, buffer));

        tracing::debug!(id, width, height, "image added");
        Ok(id)
    }

    /// Select the topmost image under `(x, y)`, or clear the selection.
    pub fn select_image(&mut self, x: f64, y: f64) -> Option<ImageId> {
        let point = Point::new(x, y);
        self.selected = self
            .images
            .iter()
            .rev()
            .find(|image| image.transform.contains(point))
            .map(|image| image.id);

        tracing::debug!(x, y, selected = ?self.selected, "selection updated");
        self.selected
    }

    pub fn selected_image(&self) -> Option<ImageId> {
        self.selected
    }

    /// Remove the selected image, if any. Returns the removed id.
    pub fn delete_selected_image(&mut self) -> Option<ImageId> {
        let id = self.selected.take()?;
        let index = self.index_of(id)?;
        self.images.remove(index);

        tracing::debug!(id, "image deleted");
        Some(id)
    }

    pub fn move_image_relative(&mut self, id: ImageId, dx: f64, dy: f64) -> Result<(), SceneError> {
        let transform = &mut self.image_mut(id)?.transform;
        transform.x += dx;
        transform.y += dy;
        Ok(())
    }

    pub fn move_image_absolute(&mut self, id: ImageId, x: f64, y: f64) -> Result<(), SceneError> {
        let transform = &mut self.image_mut(id)?.transform;
        transform.x = x;
        transform.y = y;
        Ok(())
    }

    /// Set the displayed size. Position, rotation and intrinsic size are kept.
    pub fn update_image_size(&mut self, id: ImageId, width: f64, height: f64) -> Result<(), SceneError> {
        let index = self.index_of(id).ok_or(SceneError::NotFound(id))?;
        let (width, height) = self.config.resolve_size(width, height)?;
        let transform = &mut self.images[index].transform;
        transform.width = width;
        transform.height = height;
        Ok(())
    }

    pub fn update_image_rotation(&mut self, id: ImageId, degrees: f64) -> Result<(), SceneError> {
        self.image_mut(id)?.transform.rotation_degrees = degrees;
        Ok(())
    }

    /// Combined resize + reposition, as issued by a corner drag handle.
    /// Nothing is written if the id or the size is rejected.
    pub fn update_image_geometry(
        &mut self,
        id: ImageId,
        width: f64,
        height: f64,
        x: f64,
        y: f64,
    ) -> Result<(), SceneError> {
        let index = self.index_of(id).ok_or(SceneError::NotFound(id))?;
        let (width, height) = self.config.resolve_size(width, height)?;
        let transform = &mut self.images[index].transform;
        transform.width = width;
        transform.height = height;
        transform.x = x;
        transform.y = y;
        Ok(())
    }

    pub fn get_image_size(&self, id: ImageId) -> Result<ImageSize, SceneError> {
        let t = &self.image(id)?.transform;
        Ok(ImageSize {
            width: t.width,
            height: t.height,
            original_width: t.original_width,
            original_height: t.original_height,
        })
    }

    pub fn get_image_pos(&self, id: ImageId) -> Result<(f64, f64), SceneError> {
        let t = &self.image(id)?.transform;
        Ok((t.x, t.y))
    }

    pub fn get_image_rotation(&self, id: ImageId) -> Result<f64, SceneError> {
        Ok(self.image(id)?.transform.rotation_degrees)
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn contains(&self, id: ImageId) -> bool {
        self.index_of(id).is_some()
    }

    /// Live ids, bottom of the z-order first.
    pub fn image_ids(&self) -> impl Iterator<Item = ImageId> + '_ {
        self.images.iter().map(|image| image.id)
    }

    pub fn image(&self, id: ImageId) -> Result<&Image<B>, SceneError> {
        self.index_of(id)
            .map(|index| &self.images[index])
            .ok_or(SceneError::NotFound(id))
    }

    fn image_mut(&mut self, id: ImageId) -> Result<&mut Image<B>, SceneError> {
        match self.index_of(id) {
            Some(index) => Ok(&mut self.images[index]),
            None => Err(SceneError::NotFound(id)),
        }
    }

    pub(crate) fn index_of(&self, id: ImageId) -> Option<usize> {
        self.images.binary_search_by_key(&id, |image| image.id).ok()
    }
}

impl<B> Default for SceneManager<B> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SizePolicy;

    type TestScene = SceneManager<()>;

    fn create_test_pixels(width: u32, height: u32) -> Vec<u8> {
        let size = (width * height * 4) as usize;
        vec![255u8; size]
    }

    fn add(scene: &mut TestScene, width: u32, height: u32) -> ImageId {
        scene
            .add_image(width, height, &create_test_pixels(width, height))
            .unwrap()
    }

    #[test]
    fn test_add_image() {
        let mut scene = TestScene::new();
        let id = add(&mut scene, 2, 2);

        assert_eq!(id, 0);
        assert_eq!(scene.image_count(), 1);
        assert_eq!(scene.get_image_pos(id), Ok((0.0, 0.0)));
        assert_eq!(scene.get_image_rotation(id), Ok(0.0));
        assert_eq!(
            scene.get_image_size(id),
            Ok(ImageSize {
                width: 2.0,
                height: 2.0,
                original_width: 2.0,
                original_height: 2.0,
            })
        );
        // adding never selects
        assert_eq!(scene.selected_image(), None);
    }

    #[test]
    fn test_add_image_invalid_buffer() {
        let mut scene = TestScene::new();
        let result = scene.add_image(10, 10, &create_test_pixels(2, 2));

        assert!(matches!(result, Err(SceneError::InvalidBufferSize { .. })));
        assert!(scene.is_empty());

        // a rejected add does not consume an id
        assert_eq!(add(&mut scene, 1, 1), 0);
    }

    #[test]
    fn test_ids_strictly_increase_and_are_never_reused() {
        let mut scene = TestScene::new();
        let ids: Vec<_> = (0..5).map(|_| add(&mut scene, 1, 1)).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert_eq!(scene.image_count(), 5);

        scene.move_image_absolute(4, 10.0, 10.0).unwrap();
        assert_eq!(scene.select_image(10.5, 10.5), Some(4));
        assert_eq!(scene.delete_selected_image(), Some(4));

        let next = add(&mut scene, 1, 1);
        assert_eq!(next, 5);
        assert_eq!(scene.get_image_pos(4), Err(SceneError::NotFound(4)));
        assert_eq!(scene.image_ids().collect::<Vec<_>>(), vec![0, 1, 2, 3, 5]);
    }

    #[test]
    fn test_select_topmost_wins() {
        let mut scene = TestScene::new();
        let a = add(&mut scene, 100, 100);
        let b = add(&mut scene, 50, 50);
        scene.move_image_absolute(b, 10.0, 10.0).unwrap();

        assert_eq!(scene.select_image(30.0, 30.0), Some(b));
        assert_eq!(scene.selected_image(), Some(b));
        // only A covers this point
        assert_eq!(scene.select_image(80.0, 80.0), Some(a));
    }

    #[test]
    fn test_select_miss_clears_selection() {
        let mut scene = TestScene::new();
        let a = add(&mut scene, 10, 10);

        assert_eq!(scene.select_image(5.0, 5.0), Some(a));
        assert_eq!(scene.select_image(500.0, 500.0), None);
        assert_eq!(scene.selected_image(), None);
    }

    #[test]
    fn test_select_respects_rotation() {
        let mut scene = TestScene::new();
        let a = add(&mut scene, 100, 100);
        scene.update_image_rotation(a, 45.0).unwrap();

        assert_eq!(scene.select_image(50.0, 50.0), Some(a));
        assert_eq!(scene.select_image(95.0, 5.0), None);
        assert_eq!(scene.select_image(50.0, -15.0), Some(a));
    }

    #[test]
    fn test_delete_without_selection_is_noop() {
        let mut scene = TestScene::new();
        add(&mut scene, 4, 4);

        assert_eq!(scene.delete_selected_image(), None);
        assert_eq!(scene.delete_selected_image(), None);
        assert_eq!(scene.image_count(), 1);
    }

    #[test]
    fn test_delete_selected_clears_selection() {
        let mut scene = TestScene::new();
        let a = add(&mut scene, 4, 4);
        scene.select_image(1.0, 1.0);

        assert_eq!(scene.delete_selected_image(), Some(a));
        assert_eq!(scene.selected_image(), None);
        assert!(!scene.contains(a));
        assert_eq!(scene.get_image_size(a), Err(SceneError::NotFound(a)));
        assert_eq!(scene.delete_selected_image(), None);
    }

    #[test]
    fn test_scenario_delete_top_then_reselect() {
        // A is 100x100 at the origin and never moved, so it covers (30, 30);
        // B (50x50 at 10,10) sits on top of it there.
        let mut scene = TestScene::new();
        let a = add(&mut scene, 100, 100);
        let b = add(&mut scene, 50, 50);
        scene.move_image_absolute(b, 10.0, 10.0).unwrap();

        assert_eq!(scene.select_image(30.0, 30.0), Some(b));
        scene.delete_selected_image();
        assert_eq!(scene.select_image(30.0, 30.0), Some(a));

        // moving A away leaves nothing under the point
        scene.move_image_absolute(a, 200.0, 200.0).unwrap();
        assert_eq!(scene.select_image(30.0, 30.0), None);
    }

    #[test]
    fn test_move_relative_and_absolute() {
        let mut scene = TestScene::new();
        let id = add(&mut scene, 2, 2);

        scene.move_image_relative(id, 5.0, -3.0).unwrap();
        scene.move_image_relative(id, 1.5, 1.0).unwrap();
        assert_eq!(scene.get_image_pos(id), Ok((6.5, -2.0)));

        scene.move_image_absolute(id, 123.25, 456.5).unwrap();
        assert_eq!(scene.get_image_pos(id), Ok((123.25, 456.5)));
    }

    #[test]
    fn test_stale_id_reports_not_found() {
        let mut scene = TestScene::new();
        assert_eq!(scene.move_image_relative(9, 1.0, 1.0), Err(SceneError::NotFound(9)));
        assert_eq!(scene.move_image_absolute(9, 1.0, 1.0), Err(SceneError::NotFound(9)));
        assert_eq!(scene.update_image_size(9, 1.0, 1.0), Err(SceneError::NotFound(9)));
        assert_eq!(scene.update_image_rotation(9, 1.0), Err(SceneError::NotFound(9)));
        assert_eq!(scene.get_image_rotation(9), Err(SceneError::NotFound(9)));
    }

    #[test]
    fn test_stale_id_checked_before_size() {
        let mut scene = TestScene::new();
        let id = add(&mut scene, 2, 2);
        scene.select_image(1.0, 1.0);
        scene.delete_selected_image();

        assert_eq!(scene.update_image_size(id, f64::NAN, 1.0), Err(SceneError::NotFound(id)));
        assert_eq!(
            scene.update_image_geometry(id, 1.0, f64::INFINITY, 0.0, 0.0),
            Err(SceneError::NotFound(id))
        );
    }

    #[test]
    fn test_update_size_keeps_other_fields() {
        let mut scene = TestScene::new();
        let id = add(&mut scene, 20, 10);
        scene.move_image_absolute(id, 3.0, 4.0).unwrap();
        scene.update_image_rotation(id, 30.0).unwrap();

        scene.update_image_size(id, 40.0, 25.0).unwrap();
        let size = scene.get_image_size(id).unwrap();
        assert_eq!((size.width, size.height), (40.0, 25.0));
        assert_eq!((size.original_width, size.original_height), (20.0, 10.0));
        assert_eq!(scene.get_image_pos(id), Ok((3.0, 4.0)));
        assert_eq!(scene.get_image_rotation(id), Ok(30.0));
    }

    #[test]
    fn test_update_size_clamps_by_default() {
        let mut scene = TestScene::new();
        let id = add(&mut scene, 2, 2);

        scene.update_image_size(id, 9000.0, -12.0).unwrap();
        let size = scene.get_image_size(id).unwrap();
        assert_eq!((size.width, size.height), (2560.0, 12.0));

        assert!(scene.update_image_size(id, f64::NAN, 1.0).is_err());
        assert_eq!(scene.get_image_size(id).unwrap().width, 2560.0);
    }

    #[test]
    fn test_update_size_trust_policy() {
        let mut scene = TestScene::with_config(EngineConfig {
            size_policy: SizePolicy::Trust,
            ..EngineConfig::default()
        });
        let id = add(&mut scene, 2, 2);

        scene.update_image_size(id, 9000.0, 0.25).unwrap();
        let size = scene.get_image_size(id).unwrap();
        assert_eq!((size.width, size.height), (9000.0, 0.25));
        assert!(scene.update_image_size(id, -1.0, 1.0).is_err());
    }

    #[test]
    fn test_rotation_stored_as_given() {
        let mut scene = TestScene::new();
        let id = add(&mut scene, 2, 2);

        scene.update_image_rotation(id, 405.0).unwrap();
        assert_eq!(scene.get_image_rotation(id), Ok(405.0));
        scene.update_image_rotation(id, -30.5).unwrap();
        assert_eq!(scene.get_image_rotation(id), Ok(-30.5));
    }

    #[test]
    fn test_update_geometry_is_atomic() {
        let mut scene = TestScene::new();
        let id = add(&mut scene, 10, 10);

        scene.update_image_geometry(id, 30.0, 20.0, 5.0, 6.0).unwrap();
        assert_eq!(scene.get_image_pos(id), Ok((5.0, 6.0)));
        assert_eq!(scene.get_image_size(id).unwrap().width, 30.0);

        assert!(scene
            .update_image_geometry(id, f64::INFINITY, 20.0, 99.0, 99.0)
            .is_err());
        assert_eq!(scene.get_image_pos(id), Ok((5.0, 6.0)));
    }

    #[test]
    fn test_queries_reflect_latest_mutation() {
        let mut scene = TestScene::new();
        let id = add(&mut scene, 8, 8);
        for step in 0..10 {
            let value = step as f64;
            scene.move_image_absolute(id, value, -value).unwrap();
            scene.update_image_rotation(id, value * 10.0).unwrap();
            assert_eq!(scene.get_image_pos(id), Ok((value, -value)));
            assert_eq!(scene.get_image_rotation(id), Ok(value * 10.0));
        }
    }
}
