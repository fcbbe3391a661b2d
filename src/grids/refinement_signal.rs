use std::cell::RefCell;

///
/// Observer list notified synchronously at the end of a refinement.
///
/// Observers are closures that usually capture a `Weak` pointer to the dependent object.
/// An observer returns `false` once its target is gone and is then dropped from the list.
///
pub struct RefinementSignal<E>
{
    observers: RefCell<Vec<Box<dyn Fn(&E) -> bool>>>,
}

impl<E> Default for RefinementSignal<E>
{
    fn default() -> Self
    {
        Self { observers: RefCell::new(Vec::new()) }
    }
}

impl<E> std::fmt::Debug for RefinementSignal<E>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        write!(f, "RefinementSignal({} observers)", self.num_observers())
    }
}

impl<E> RefinementSignal<E>
{
    pub fn connect<F>(&self, observer: F)
    where
        F: Fn(&E) -> bool + 'static,
    {
        self.observers.borrow_mut().push(Box::new(observer));
    }

    pub fn num_observers(&self) -> usize
    {
        self.observers.borrow().len()
    }

    ///
    /// Calls every observer in registration order. Observers connected while the
    /// signal is being emitted are kept but only called on the next emission.
    ///
    pub fn emit(&self, event: &E)
    {
        let current = std::mem::take(&mut *self.observers.borrow_mut());
        let mut alive = Vec::with_capacity(current.len());
        for observer in current
        {
            if observer(event)
            {
                alive.push(observer);
            }
        }
        let mut observers = self.observers.borrow_mut();
        let added = std::mem::take(&mut *observers);
        *observers = alive;
        observers.extend(added);
    }
}

#[test]
fn check_dead_observers_are_dropped()
{
    use std::rc::Rc;
    let counter = Rc::new(RefCell::new(0));
    let signal = RefinementSignal::<usize>::default();
    let weak = Rc::downgrade(&counter);
    signal.connect(move |n| match weak.upgrade()
    {
        Some(c) =>
        {
            *c.borrow_mut() += *n;
            true
        }
        None => false,
    });
    signal.emit(&2);
    assert_eq!(*counter.borrow(), 2);
    drop(counter);
    signal.emit(&2);
    assert_eq!(signal.num_observers(), 0);
}
